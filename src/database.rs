use crate::model::*;
use serde::{de::DeserializeOwned, Serialize};
use sled::transaction::{TransactionError, Transactional};
use sled::CompareAndSwapError;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),
    #[error("record encoding error: {0}")]
    Codec(#[from] bincode::Error),
    #[error("malformed key in tree {0}")]
    CorruptKey(&'static str),
    #[error("index {0} points at a missing record")]
    BrokenIndex(&'static str),
}

pub type Result<T> = std::result::Result<T, StoreError>;

const USERS: &str = "users";
const USERS_USERNAME: &str = "users_username";
const ADMINS: &str = "admins";
const ADMINS_USERNAME: &str = "admins_username";
const THEATRES: &str = "theatres";
const MOVIES: &str = "movies";

fn serialize_id(id: Id) -> [u8; 8] {
    id.to_bytes()
}

fn deserialize_id(tree: &'static str, key: &[u8]) -> Result<Id> {
    Id::from_bytes(key).ok_or(StoreError::CorruptKey(tree))
}

fn account_trees(role: Role) -> (&'static str, &'static str) {
    match role {
        Role::User => (USERS, USERS_USERNAME),
        Role::Admin => (ADMINS, ADMINS_USERNAME),
    }
}

pub trait AccountDb {
    /// Returns `None` when the username is already taken within the role's collection.
    fn add_account(&self, role: Role, account: &Account) -> Result<Option<Id>>;
    fn get_account_by_username(&self, role: Role, username: &str)
        -> Result<Option<(Id, Account)>>;
}

pub trait TheatreDb {
    fn add_theatre(&self, theatre: &Theatre) -> Result<Id>;
    fn get_theatre(&self, id: Id) -> Result<Option<Theatre>>;
    fn list_theatres(&self) -> Result<Vec<(Id, Theatre)>>;
    fn remove_theatre(&self, id: Id) -> Result<Option<Theatre>>;
    /// Atomic read-modify-write of a single theatre. `f` may run more than once.
    fn update_theatre<F: FnMut(&mut Theatre)>(&self, id: Id, f: F) -> Result<Option<Theatre>>;
}

pub trait MovieDb {
    fn add_movie(&self, movie: &Movie) -> Result<Id>;
    fn get_movie(&self, id: Id) -> Result<Option<Movie>>;
    fn list_movies_by_theatre(&self, theatre_id: Id) -> Result<Vec<(Id, Movie)>>;
    fn remove_movie(&self, id: Id) -> Result<Option<Movie>>;
    /// Atomic read-modify-write of a single movie. `f` may run more than once.
    fn update_movie<F: FnMut(&mut Movie)>(&self, id: Id, f: F) -> Result<Option<Movie>>;
}

fn insert_record<T: Serialize>(db: &sled::Db, name: &'static str, record: &T) -> Result<Id> {
    let tree = db.open_tree(name)?;
    let id = Id::from(db.generate_id()?);
    tree.insert(serialize_id(id), bincode::serialize(record)?)?;
    Ok(id)
}

fn get_record<T: DeserializeOwned>(db: &sled::Db, name: &'static str, id: Id) -> Result<Option<T>> {
    let tree = db.open_tree(name)?;
    match tree.get(serialize_id(id))? {
        Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
        None => Ok(None),
    }
}

fn scan_records<T, P>(db: &sled::Db, name: &'static str, mut keep: P) -> Result<Vec<(Id, T)>>
where
    T: DeserializeOwned,
    P: FnMut(&T) -> bool,
{
    let tree = db.open_tree(name)?;
    let mut records = Vec::new();
    for entry in tree.iter() {
        let (key, bytes) = entry?;
        let record: T = bincode::deserialize(&bytes)?;
        if keep(&record) {
            records.push((deserialize_id(name, &key)?, record));
        }
    }
    Ok(records)
}

fn remove_record<T: DeserializeOwned>(
    db: &sled::Db,
    name: &'static str,
    id: Id,
) -> Result<Option<T>> {
    let tree = db.open_tree(name)?;
    match tree.remove(serialize_id(id))? {
        Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
        None => Ok(None),
    }
}

fn update_record<T, F>(db: &sled::Db, name: &'static str, id: Id, mut f: F) -> Result<Option<T>>
where
    T: Serialize + DeserializeOwned,
    F: FnMut(&mut T),
{
    let tree = db.open_tree(name)?;
    let key = serialize_id(id);
    let mut current = tree.get(key)?;
    loop {
        let old = match &current {
            Some(bytes) => bytes,
            None => return Ok(None),
        };
        let mut record: T = bincode::deserialize(old)?;
        f(&mut record);
        let new = bincode::serialize(&record)?;
        match tree.compare_and_swap(key, Some(old), Some(new))? {
            Ok(()) => return Ok(Some(record)),
            Err(CompareAndSwapError { current: actual, .. }) => current = actual,
        }
    }
}

impl AccountDb for sled::Db {
    fn add_account(&self, role: Role, account: &Account) -> Result<Option<Id>> {
        let (records_name, index_name) = account_trees(role);
        let records = self.open_tree(records_name)?;
        let by_username = self.open_tree(index_name)?;
        let id = Id::from(self.generate_id()?);
        let key = serialize_id(id);
        let record = bincode::serialize(account)?;
        let outcome = (&records, &by_username).transaction(|(records, by_username)| {
            records.insert(&key[..], record.as_slice())?;
            if by_username
                .insert(account.username.as_bytes(), &key[..])?
                .is_some()
            {
                return sled::transaction::abort(());
            }
            Ok(())
        });
        match outcome {
            Ok(()) => Ok(Some(id)),
            Err(TransactionError::Abort(())) => Ok(None),
            Err(TransactionError::Storage(err)) => Err(err.into()),
        }
    }

    fn get_account_by_username(
        &self,
        role: Role,
        username: &str,
    ) -> Result<Option<(Id, Account)>> {
        let (records_name, index_name) = account_trees(role);
        let by_username = self.open_tree(index_name)?;
        let records = self.open_tree(records_name)?;
        if let Some(key) = by_username.get(username.as_bytes())? {
            let bytes = records
                .get(&key)?
                .ok_or(StoreError::BrokenIndex(index_name))?;
            Ok(Some((
                deserialize_id(index_name, &key)?,
                bincode::deserialize(&bytes)?,
            )))
        } else {
            Ok(None)
        }
    }
}

impl TheatreDb for sled::Db {
    fn add_theatre(&self, theatre: &Theatre) -> Result<Id> {
        insert_record(self, THEATRES, theatre)
    }

    fn get_theatre(&self, id: Id) -> Result<Option<Theatre>> {
        get_record(self, THEATRES, id)
    }

    fn list_theatres(&self) -> Result<Vec<(Id, Theatre)>> {
        scan_records(self, THEATRES, |_| true)
    }

    fn remove_theatre(&self, id: Id) -> Result<Option<Theatre>> {
        remove_record(self, THEATRES, id)
    }

    fn update_theatre<F: FnMut(&mut Theatre)>(&self, id: Id, f: F) -> Result<Option<Theatre>> {
        update_record(self, THEATRES, id, f)
    }
}

impl MovieDb for sled::Db {
    fn add_movie(&self, movie: &Movie) -> Result<Id> {
        insert_record(self, MOVIES, movie)
    }

    fn get_movie(&self, id: Id) -> Result<Option<Movie>> {
        get_record(self, MOVIES, id)
    }

    fn list_movies_by_theatre(&self, theatre_id: Id) -> Result<Vec<(Id, Movie)>> {
        scan_records(self, MOVIES, |movie: &Movie| movie.theatre_id == theatre_id)
    }

    fn remove_movie(&self, id: Id) -> Result<Option<Movie>> {
        remove_record(self, MOVIES, id)
    }

    fn update_movie<F: FnMut(&mut Movie)>(&self, id: Id, f: F) -> Result<Option<Movie>> {
        update_record(self, MOVIES, id, f)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::collections::BTreeSet;

    pub(crate) fn temporary_db() -> sled::Db {
        sled::Config::new().temporary(true).open().unwrap()
    }

    pub(crate) fn theatre(name: &str) -> Theatre {
        Theatre {
            name: name.to_owned(),
            seats: 100,
            address: "1 Main Street".to_owned(),
            img: "grand.png".to_owned(),
            movies: BTreeSet::new(),
        }
    }

    pub(crate) fn movie(name: &str, theatre_id: Id) -> Movie {
        Movie {
            name: name.to_owned(),
            actors: vec!["A".to_owned(), "B".to_owned()],
            poster: "poster.png".to_owned(),
            release_date: NaiveDate::from_ymd_opt(2021, 10, 22).unwrap(),
            genre: "Drama".to_owned(),
            theatre_id,
            booked_by: BTreeSet::new(),
        }
    }

    fn account(username: &str) -> Account {
        Account {
            username: username.to_owned(),
            password_hash: "hash".to_owned(),
        }
    }

    #[test]
    fn usernames_are_unique_per_collection() {
        let db = temporary_db();
        let id = db.add_account(Role::User, &account("alice")).unwrap();
        assert!(id.is_some());
        assert_eq!(db.add_account(Role::User, &account("alice")).unwrap(), None);
        assert!(db.add_account(Role::Admin, &account("alice")).unwrap().is_some());

        let (found, stored) = db
            .get_account_by_username(Role::User, "alice")
            .unwrap()
            .unwrap();
        assert_eq!(Some(found), id);
        assert_eq!(stored, account("alice"));
        assert!(db
            .get_account_by_username(Role::Admin, "bob")
            .unwrap()
            .is_none());
    }

    #[test]
    fn rejected_account_leaves_no_record() {
        let db = temporary_db();
        db.add_account(Role::User, &account("alice")).unwrap();
        db.add_account(Role::User, &account("alice")).unwrap();
        assert_eq!(db.open_tree(USERS).unwrap().len(), 1);
    }

    #[test]
    fn update_of_missing_record_is_none() {
        let db = temporary_db();
        let updated = db
            .update_movie(Id::from(42), |m| {
                m.booked_by.insert(Id::from(1));
            })
            .unwrap();
        assert!(updated.is_none());
    }

    #[test]
    fn update_persists_changes() {
        let db = temporary_db();
        let id = db.add_theatre(&theatre("Grand")).unwrap();
        let updated = db
            .update_theatre(id, |t| {
                t.movies.insert(Id::from(9));
            })
            .unwrap()
            .unwrap();
        assert!(updated.movies.contains(&Id::from(9)));
        assert_eq!(db.get_theatre(id).unwrap(), Some(updated));
    }

    #[test]
    fn movies_are_listed_per_theatre() {
        let db = temporary_db();
        let grand = db.add_theatre(&theatre("Grand")).unwrap();
        let royal = db.add_theatre(&theatre("Royal")).unwrap();
        let dune = db.add_movie(&movie("Dune", grand)).unwrap();
        db.add_movie(&movie("Heat", royal)).unwrap();

        let listed = db.list_movies_by_theatre(grand).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].0, dune);
        assert_eq!(db.list_theatres().unwrap().len(), 2);
    }

    #[test]
    fn remove_returns_the_record_once() {
        let db = temporary_db();
        let grand = db.add_theatre(&theatre("Grand")).unwrap();
        let id = db.add_movie(&movie("Dune", grand)).unwrap();
        assert_eq!(db.remove_movie(id).unwrap().unwrap().name, "Dune");
        assert!(db.remove_movie(id).unwrap().is_none());
        assert!(db.get_movie(id).unwrap().is_none());
    }
}
