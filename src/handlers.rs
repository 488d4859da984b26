use crate::auth::{self, HashCost, Identity, TokenIssuer, TOKEN_COOKIE};
use crate::booking;
use crate::error::AppResult;
use crate::inventory::{self, parse_id, MovieForm, TheatreForm};
use crate::model::*;
use actix_web::cookie::{time, Cookie};
use actix_web::{http::header, web, HttpResponse};
use serde::{Deserialize, Serialize};

type Tera = web::Data<tera::Tera>;
type Db = web::Data<sled::Db>;
type Tokens = web::Data<TokenIssuer>;
type Cost = web::Data<HashCost>;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(index))
        .route("/signup", web::get().to(signup_page))
        .route("/login", web::get().to(login_page))
        .route("/auth/signup", web::post().to(signup))
        .route("/auth/login", web::post().to(login))
        .route("/logout", web::get().to(logout))
        .route("/theatres", web::get().to(theatres))
        .route("/add-theatre", web::get().to(add_theatre_page))
        .route("/add-theatre", web::post().to(add_theatre))
        .route("/deleteTheatre", web::get().to(delete_theatre))
        .route("/movies", web::get().to(movies))
        .route("/movies/add", web::post().to(add_movie))
        .route("/deleteMovie", web::get().to(delete_movie))
        .route("/book/{movie_id}", web::post().to(book_movie))
        .route("/add-movie", web::get().to(add_movie_page));
}

fn redirect(location: &str) -> HttpResponse {
    HttpResponse::Found()
        .insert_header((header::LOCATION, location))
        .finish()
}

fn movies_location(theatre_id: Id) -> String {
    format!("/movies?theatreId={}", theatre_id)
}

fn render(tera: &tera::Tera, template: &str, ctx: &tera::Context) -> AppResult<HttpResponse> {
    let body = tera.render(template, ctx)?;
    Ok(HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(body))
}

fn context(identity: Option<&Identity>, special_class: &str) -> tera::Context {
    let mut ctx = tera::Context::new();
    ctx.insert("user", &identity);
    ctx.insert("is_authenticated", &identity.is_some());
    ctx.insert("is_admin", &identity.map_or(false, |id| id.is_admin));
    ctx.insert(
        "special_class",
        identity.map_or(special_class, |id| id.navbar_class()),
    );
    ctx
}

async fn index() -> HttpResponse {
    redirect("/signup")
}

async fn signup_page(tera: Tera) -> AppResult<HttpResponse> {
    let mut ctx = context(None, "signup-navbar");
    ctx.insert("title", "Signup");
    render(&tera, "signup.html", &ctx)
}

async fn login_page(tera: Tera) -> AppResult<HttpResponse> {
    let mut ctx = context(None, "login-navbar");
    ctx.insert("title", "Login");
    render(&tera, "login.html", &ctx)
}

#[derive(Serialize, Deserialize)]
struct Credentials {
    username: String,
    password: String,
}

async fn signup(params: web::Form<Credentials>, db: Db, cost: Cost) -> AppResult<HttpResponse> {
    auth::signup(db.get_ref(), *cost.get_ref(), &params.username, &params.password)?;
    Ok(redirect("/login"))
}

async fn login(params: web::Form<Credentials>, db: Db, tokens: Tokens) -> AppResult<HttpResponse> {
    let identity = auth::login(db.get_ref(), &params.username, &params.password)?;
    let token = tokens.issue(&identity)?;
    let mut cookie = Cookie::build(TOKEN_COOKIE, token)
        .path("/")
        .http_only(true)
        .finish();
    if let Some(secs) = tokens.ttl().and_then(|ttl| i64::try_from(ttl.as_secs()).ok()) {
        cookie.set_max_age(time::Duration::seconds(secs));
    }
    Ok(HttpResponse::Found()
        .insert_header((header::LOCATION, "/theatres"))
        .cookie(cookie)
        .finish())
}

async fn logout() -> HttpResponse {
    let mut cookie = Cookie::build(TOKEN_COOKIE, "").path("/").finish();
    cookie.make_removal();
    HttpResponse::Found()
        .insert_header((header::LOCATION, "/login"))
        .cookie(cookie)
        .finish()
}

async fn theatres(identity: Identity, tera: Tera, db: Db) -> AppResult<HttpResponse> {
    let theatres: Vec<_> = inventory::list_theatres(db.get_ref())?
        .into_iter()
        .map(|(id, record)| Entry { id, record })
        .collect();
    let mut ctx = context(Some(&identity), "default-navbar");
    ctx.insert("theatres", &theatres);
    ctx.insert("state", "theatre");
    render(&tera, "theatres.html", &ctx)
}

async fn add_theatre_page(identity: Identity, tera: Tera) -> AppResult<HttpResponse> {
    render(&tera, "add_theatre.html", &context(Some(&identity), "default-navbar"))
}

async fn add_theatre(
    _identity: Identity,
    form: web::Form<TheatreForm>,
    db: Db,
) -> AppResult<HttpResponse> {
    let theatre = form.into_inner().validate()?;
    inventory::add_theatre(db.get_ref(), &theatre)?;
    Ok(redirect("/theatres"))
}

#[derive(Deserialize)]
struct TheatreQuery {
    #[serde(rename = "theatreId")]
    theatre_id: Option<String>,
}

#[derive(Deserialize)]
struct MovieQuery {
    #[serde(rename = "movieId")]
    movie_id: Option<String>,
}

async fn delete_theatre(
    _identity: Identity,
    query: web::Query<TheatreQuery>,
    db: Db,
) -> AppResult<HttpResponse> {
    let id = parse_id(query.theatre_id.as_deref(), "Theatre")?;
    inventory::delete_theatre(db.get_ref(), id)?;
    Ok(redirect("/theatres"))
}

#[derive(Serialize)]
struct MovieView {
    #[serde(flatten)]
    entry: Entry<Movie>,
    booked: bool,
}

async fn movies(
    identity: Identity,
    query: web::Query<TheatreQuery>,
    tera: Tera,
    db: Db,
) -> AppResult<HttpResponse> {
    let theatre_id = parse_id(query.theatre_id.as_deref(), "Theatre")?;
    let movies: Vec<_> = inventory::list_movies(db.get_ref(), theatre_id)?
        .into_iter()
        .map(|(id, record)| MovieView {
            booked: record.booked_by.contains(&identity.subject),
            entry: Entry { id, record },
        })
        .collect();
    let mut ctx = context(Some(&identity), "default-navbar");
    ctx.insert("movies", &movies);
    ctx.insert("theatre_id", &theatre_id);
    render(&tera, "movies.html", &ctx)
}

async fn add_movie_page(
    identity: Identity,
    query: web::Query<TheatreQuery>,
    tera: Tera,
) -> AppResult<HttpResponse> {
    let theatre_id = parse_id(query.theatre_id.as_deref(), "Theatre")?;
    let mut ctx = context(Some(&identity), "default-navbar");
    ctx.insert("theatre_id", &theatre_id);
    render(&tera, "add_movie.html", &ctx)
}

async fn add_movie(
    _identity: Identity,
    form: web::Form<MovieForm>,
    db: Db,
) -> AppResult<HttpResponse> {
    let movie = form.into_inner().validate()?;
    inventory::add_movie(db.get_ref(), &movie)?;
    Ok(redirect(&movies_location(movie.theatre_id)))
}

async fn delete_movie(
    _identity: Identity,
    query: web::Query<MovieQuery>,
    db: Db,
) -> AppResult<HttpResponse> {
    let id = parse_id(query.movie_id.as_deref(), "Movie")?;
    inventory::delete_movie(db.get_ref(), id)?;
    Ok(redirect("/theatres"))
}

async fn book_movie(
    identity: Identity,
    path: web::Path<String>,
    db: Db,
) -> AppResult<HttpResponse> {
    let movie_id = parse_id(Some(path.as_str()), "Movie")?;
    let movie = booking::book_movie(db.get_ref(), movie_id, identity.subject)?;
    Ok(redirect(&movies_location(movie.theatre_id)))
}
