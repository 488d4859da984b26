mod auth;
mod booking;
mod config;
mod database;
mod error;
mod handlers;
mod inventory;
mod model;

use actix_web::{middleware::Logger, web, App, HttpServer};
use auth::{HashCost, TokenIssuer};
use config::Config;
use log::info;

#[actix_rt::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("cinebook=debug,actix_web=info"),
    )
    .init();

    let config = Config::from_env()?;
    let tera = web::Data::new(tera::Tera::new(&config.template_glob())?);
    let db = sled::open(&config.database_path)?;
    info!("opened database at {}", config.database_path.display());

    let cost = HashCost(config.bcrypt_cost);
    if let Some(admin) = &config.admin {
        if auth::seed_admin(&db, cost, &admin.username, &admin.password)? {
            info!("created administrator {}", admin.username);
        }
    }

    let tokens = web::Data::new(TokenIssuer::new(
        config.jwt_secret.as_bytes(),
        config.token_ttl,
    ));
    let cost = web::Data::new(cost);
    let db_data = web::Data::new(db.clone());

    info!("listening on {}:{}", config.bind_address, config.port);
    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(tera.clone())
            .app_data(db_data.clone())
            .app_data(tokens.clone())
            .app_data(cost.clone())
            .configure(handlers::configure)
    })
    .bind((config.bind_address.as_str(), config.port))?
    .run()
    .await?;

    db.flush_async().await?;
    info!("database flushed, shutting down");
    Ok(())
}
