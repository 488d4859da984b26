use crate::database::{MovieDb, TheatreDb};
use crate::error::{AppError, AppResult};
use crate::model::*;
use chrono::NaiveDate;
use log::{info, warn};
use serde::Deserialize;
use std::collections::BTreeSet;

/// Raw add-theatre form. Every field is optional here so that a missing one
/// surfaces as `InvalidField` instead of a generic form rejection.
#[derive(Debug, Default, Deserialize)]
pub struct TheatreForm {
    pub name: Option<String>,
    pub seats: Option<String>,
    pub address: Option<String>,
    pub img: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovieForm {
    pub name: Option<String>,
    /// Comma separated.
    pub actors: Option<String>,
    pub poster: Option<String>,
    pub release_date: Option<String>,
    pub genre: Option<String>,
    pub theatre_id: Option<String>,
}

fn required(value: Option<String>, field: &'static str) -> AppResult<String> {
    match value {
        Some(value) if !value.trim().is_empty() => Ok(value.trim().to_owned()),
        _ => Err(AppError::InvalidField(field)),
    }
}

pub fn parse_id(raw: Option<&str>, kind: &'static str) -> AppResult<Id> {
    raw.and_then(|raw| raw.parse().ok())
        .ok_or(AppError::InvalidId(kind))
}

/// Splits `"A, B"` into `["A", "B"]`. Empty entries are rejected.
pub fn parse_actors(list: &str) -> AppResult<Vec<String>> {
    list.split(',')
        .map(|actor| match actor.trim() {
            "" => Err(AppError::InvalidField("actors")),
            actor => Ok(actor.to_owned()),
        })
        .collect()
}

impl TheatreForm {
    pub fn validate(self) -> AppResult<Theatre> {
        let seats = required(self.seats, "seats")?
            .parse()
            .map_err(|_| AppError::InvalidField("seats"))?;
        Ok(Theatre {
            name: required(self.name, "name")?,
            seats,
            address: required(self.address, "address")?,
            img: required(self.img, "img")?,
            movies: BTreeSet::new(),
        })
    }
}

impl MovieForm {
    pub fn validate(self) -> AppResult<Movie> {
        let theatre_id = parse_id(self.theatre_id.as_deref(), "Theatre")?;
        let release_date = NaiveDate::parse_from_str(
            &required(self.release_date, "releaseDate")?,
            "%Y-%m-%d",
        )
        .map_err(|_| AppError::InvalidField("releaseDate"))?;
        Ok(Movie {
            name: required(self.name, "name")?,
            actors: parse_actors(&required(self.actors, "actors")?)?,
            poster: required(self.poster, "poster")?,
            release_date,
            genre: required(self.genre, "genre")?,
            theatre_id,
            booked_by: BTreeSet::new(),
        })
    }
}

pub fn add_theatre<D: TheatreDb>(db: &D, theatre: &Theatre) -> AppResult<Id> {
    let id = db.add_theatre(theatre)?;
    info!("added theatre {} ({})", theatre.name, id);
    Ok(id)
}

pub fn list_theatres<D: TheatreDb>(db: &D) -> AppResult<Vec<(Id, Theatre)>> {
    Ok(db.list_theatres()?)
}

/// Movies of the deleted theatre are left in place with a dangling `theatre_id`.
pub fn delete_theatre<D: TheatreDb>(db: &D, id: Id) -> AppResult<Theatre> {
    let theatre = db.remove_theatre(id)?.ok_or(AppError::NotFound("Theatre"))?;
    info!("deleted theatre {} ({})", theatre.name, id);
    Ok(theatre)
}

/// Stores the movie and then links it into its theatre. The two writes are
/// separate; a failure between them leaves the movie unlisted on the theatre.
pub fn add_movie<D: TheatreDb + MovieDb>(db: &D, movie: &Movie) -> AppResult<Id> {
    if db.get_theatre(movie.theatre_id)?.is_none() {
        return Err(AppError::NotFound("Theatre"));
    }
    let id = db.add_movie(movie)?;
    let linked = db.update_theatre(movie.theatre_id, |theatre| {
        theatre.movies.insert(id);
    })?;
    if linked.is_none() {
        warn!("theatre {} vanished before movie {} was linked", movie.theatre_id, id);
    }
    info!("added movie {} ({}) to theatre {}", movie.name, id, movie.theatre_id);
    Ok(id)
}

pub fn list_movies<D: MovieDb>(db: &D, theatre_id: Id) -> AppResult<Vec<(Id, Movie)>> {
    Ok(db.list_movies_by_theatre(theatre_id)?)
}

pub fn delete_movie<D: TheatreDb + MovieDb>(db: &D, id: Id) -> AppResult<Movie> {
    let movie = db.remove_movie(id)?.ok_or(AppError::NotFound("Movie"))?;
    db.update_theatre(movie.theatre_id, |theatre| {
        theatre.movies.remove(&id);
    })?;
    info!("deleted movie {} ({})", movie.name, id);
    Ok(movie)
}
