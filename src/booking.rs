use crate::database::MovieDb;
use crate::error::{AppError, AppResult};
use crate::model::{Id, Movie};
use log::info;

/// Adds `user_id` to the movie's bookings. Booking twice is a no-op.
///
/// Seat counts are not consulted; a booking carries no quantity.
pub fn book_movie<D: MovieDb>(db: &D, movie_id: Id, user_id: Id) -> AppResult<Movie> {
    let mut added = false;
    let movie = db
        .update_movie(movie_id, |movie| {
            added = movie.booked_by.insert(user_id);
        })?
        .ok_or(AppError::NotFound("Movie"))?;
    if added {
        info!("{} booked movie {} ({})", user_id, movie.name, movie_id);
    }
    Ok(movie)
}
