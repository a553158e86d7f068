//! Demonstration schema: people, books, and sentences tagged through a join table.

use crate::error::Result;
use crate::orm::{BoxFuture, Db, FromRow, Migration, Model, Query};
use chrono::{Local, NaiveDate, NaiveDateTime};
use sqlx::sqlite::SqliteConnection;
use std::fmt;
use std::sync::Arc;

fn now() -> NaiveDateTime {
    Local::now().naive_local()
}

fn or_none<T: fmt::Display>(value: &Option<T>) -> String {
    match value {
        Some(v) => v.to_string(),
        None => "None".to_string(),
    }
}

fn columns(defs: &[(&str, &str)]) -> Vec<(String, String)> {
    defs.iter()
        .map(|(name, sqltype)| (name.to_string(), sqltype.to_string()))
        .collect()
}

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct Person {
    pub id: i64,
    pub name: String,
    pub is_man: bool,
    pub score: Option<i64>,
    pub join_date: Option<NaiveDate>,
    pub created_at: Option<NaiveDateTime>,
    pub updated_at: Option<NaiveDateTime>,
}

impl Model for Person {
    fn table_name() -> &'static str {
        "person"
    }

    fn create_table_sql() -> String {
        "CREATE TABLE IF NOT EXISTS person (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name VARCHAR(255) NOT NULL UNIQUE,
            is_man BOOLEAN NOT NULL,
            score INTEGER,
            join_date DATE,
            created_at DATETIME,
            updated_at DATETIME
        );
        CREATE INDEX IF NOT EXISTS ix_person_name ON person (name)"
            .to_string()
    }

    fn columns() -> Vec<(String, String)> {
        columns(&[
            ("id", "INTEGER"),
            ("name", "VARCHAR(255)"),
            ("is_man", "BOOLEAN"),
            ("score", "INTEGER"),
            ("join_date", "DATE"),
            ("created_at", "DATETIME"),
            ("updated_at", "DATETIME"),
        ])
    }
}

impl Person {
    pub fn query() -> Query<Person> {
        Query::new()
    }

    /// Write every field back, stamping `updated_at`.
    pub async fn save(&mut self, conn: &mut SqliteConnection) -> Result<()> {
        self.updated_at = Some(now());
        sqlx::query(
            "UPDATE person SET name = ?, is_man = ?, score = ?, join_date = ?, \
             created_at = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&self.name)
        .bind(self.is_man)
        .bind(self.score)
        .bind(self.join_date)
        .bind(self.created_at)
        .bind(self.updated_at)
        .bind(self.id)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }
}

impl fmt::Display for Person {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<Person('{}', '{}', '{}', '{}', '{}', '{}')>",
            self.name,
            if self.is_man { "True" } else { "False" },
            or_none(&self.score),
            or_none(&self.join_date),
            or_none(&self.created_at),
            or_none(&self.updated_at)
        )
    }
}

/// A person not yet written. Timestamps are taken when the value is built,
/// so every row gets its own.
#[derive(Debug, Clone)]
pub struct NewPerson {
    pub name: String,
    pub is_man: bool,
    pub score: Option<i64>,
    pub join_date: NaiveDate,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl NewPerson {
    pub fn new(name: impl Into<String>, is_man: bool) -> Self {
        let now = now();
        NewPerson {
            name: name.into(),
            is_man,
            score: None,
            join_date: now.date(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn score(mut self, score: i64) -> Self {
        self.score = Some(score);
        self
    }

    pub async fn insert(self, conn: &mut SqliteConnection) -> Result<Person> {
        let id = sqlx::query(
            "INSERT INTO person (name, is_man, score, join_date, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&self.name)
        .bind(self.is_man)
        .bind(self.score)
        .bind(self.join_date)
        .bind(self.created_at)
        .bind(self.updated_at)
        .execute(&mut *conn)
        .await?
        .last_insert_rowid();

        Ok(Person {
            id,
            name: self.name,
            is_man: self.is_man,
            score: self.score,
            join_date: Some(self.join_date),
            created_at: Some(self.created_at),
            updated_at: Some(self.updated_at),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct Book {
    pub id: i64,
    pub name: String,
    pub content: Option<String>,
}

impl Model for Book {
    fn table_name() -> &'static str {
        "book"
    }

    fn create_table_sql() -> String {
        "CREATE TABLE IF NOT EXISTS book (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name VARCHAR(255) NOT NULL,
            content VARCHAR(255)
        )"
        .to_string()
    }

    fn columns() -> Vec<(String, String)> {
        columns(&[
            ("id", "INTEGER"),
            ("name", "VARCHAR(255)"),
            ("content", "VARCHAR(255)"),
        ])
    }
}

impl Book {
    pub fn query() -> Query<Book> {
        Query::new()
    }
}

#[derive(Debug, Clone)]
pub struct NewBook {
    pub name: String,
    pub content: Option<String>,
}

impl NewBook {
    pub fn new(name: impl Into<String>) -> Self {
        NewBook {
            name: name.into(),
            content: None,
        }
    }

    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub async fn insert(self, conn: &mut SqliteConnection) -> Result<Book> {
        let id = sqlx::query("INSERT INTO book (name, content) VALUES (?, ?)")
            .bind(&self.name)
            .bind(&self.content)
            .execute(&mut *conn)
            .await?
            .last_insert_rowid();
        Ok(Book {
            id,
            name: self.name,
            content: self.content,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct Tag {
    pub id: i64,
    pub name: String,
}

impl Model for Tag {
    fn table_name() -> &'static str {
        "tag"
    }

    fn create_table_sql() -> String {
        "CREATE TABLE IF NOT EXISTS tag (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name VARCHAR(50) NOT NULL UNIQUE
        )"
        .to_string()
    }

    fn columns() -> Vec<(String, String)> {
        columns(&[("id", "INTEGER"), ("name", "VARCHAR(50)")])
    }
}

impl Tag {
    pub fn query() -> Query<Tag> {
        Query::new()
    }

    /// The tag called `name`, inserting it if no such tag exists yet.
    pub async fn find_or_create(conn: &mut SqliteConnection, name: &str) -> Result<Tag> {
        if let Some(tag) = Tag::query().filter_eq("name", name).first(conn).await? {
            return Ok(tag);
        }
        let id = sqlx::query("INSERT INTO tag (name) VALUES (?)")
            .bind(name)
            .execute(&mut *conn)
            .await?
            .last_insert_rowid();
        log::debug!("Created tag `{}` with id {}", name, id);
        Ok(Tag {
            id,
            name: name.to_string(),
        })
    }

    /// Sentences carrying this tag.
    pub async fn sentences(&self, conn: &mut SqliteConnection) -> Result<Vec<Sentence>> {
        Ok(sqlx::query_as(
            "SELECT sentence.* FROM sentence \
             JOIN sentence_tag ON sentence_tag.sentence_id = sentence.id \
             WHERE sentence_tag.tag_id = ? ORDER BY sentence_tag.rowid",
        )
        .bind(self.id)
        .fetch_all(&mut *conn)
        .await?)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct Sentence {
    pub id: i64,
    pub content: String,
}

impl Model for Sentence {
    fn table_name() -> &'static str {
        "sentence"
    }

    fn create_table_sql() -> String {
        "CREATE TABLE IF NOT EXISTS sentence (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            content VARCHAR(500) NOT NULL
        )"
        .to_string()
    }

    fn columns() -> Vec<(String, String)> {
        columns(&[("id", "INTEGER"), ("content", "VARCHAR(500)")])
    }
}

impl Sentence {
    pub fn query() -> Query<Sentence> {
        Query::new()
    }

    pub async fn create(conn: &mut SqliteConnection, content: &str) -> Result<Sentence> {
        let id = sqlx::query("INSERT INTO sentence (content) VALUES (?)")
            .bind(content)
            .execute(&mut *conn)
            .await?
            .last_insert_rowid();
        Ok(Sentence {
            id,
            content: content.to_string(),
        })
    }

    /// Tags in the order they were attached.
    pub async fn tags(&self, conn: &mut SqliteConnection) -> Result<Vec<Tag>> {
        Ok(sqlx::query_as(
            "SELECT tag.* FROM tag \
             JOIN sentence_tag ON sentence_tag.tag_id = tag.id \
             WHERE sentence_tag.sentence_id = ? ORDER BY sentence_tag.rowid",
        )
        .bind(self.id)
        .fetch_all(&mut *conn)
        .await?)
    }

    pub async fn tag_names(&self, conn: &mut SqliteConnection) -> Result<Vec<String>> {
        Ok(self
            .tags(conn)
            .await?
            .into_iter()
            .map(|tag| tag.name)
            .collect())
    }

    /// Replace this sentence's tags with `names`, creating missing tags.
    /// A name repeated in `names` is attached once.
    pub async fn set_tags<I, S>(&self, conn: &mut SqliteConnection, names: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        sqlx::query("DELETE FROM sentence_tag WHERE sentence_id = ?")
            .bind(self.id)
            .execute(&mut *conn)
            .await?;

        let mut attached: Vec<String> = Vec::new();
        for name in names {
            let name = name.as_ref();
            if attached.iter().any(|a| a == name) {
                continue;
            }
            let tag = Tag::find_or_create(conn, name).await?;
            sqlx::query("INSERT INTO sentence_tag (sentence_id, tag_id) VALUES (?, ?)")
                .bind(self.id)
                .bind(tag.id)
                .execute(&mut *conn)
                .await?;
            attached.push(name.to_string());
        }
        Ok(())
    }

    /// `id: 1, content: Hello world!, tags: ["test", "test2"]`
    pub async fn describe(&self, conn: &mut SqliteConnection) -> Result<String> {
        let names = self.tag_names(conn).await?;
        Ok(format!(
            "id: {}, content: {}, tags: {:?}",
            self.id, self.content, names
        ))
    }
}

/// Row of the `sentence_tag` association table.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct SentenceTag {
    pub sentence_id: i64,
    pub tag_id: i64,
}

impl Model for SentenceTag {
    fn table_name() -> &'static str {
        "sentence_tag"
    }

    fn create_table_sql() -> String {
        "CREATE TABLE IF NOT EXISTS sentence_tag (
            sentence_id INTEGER REFERENCES sentence (id),
            tag_id INTEGER REFERENCES tag (id)
        )"
        .to_string()
    }

    fn columns() -> Vec<(String, String)> {
        columns(&[("sentence_id", "INTEGER"), ("tag_id", "INTEGER")])
    }
}

impl SentenceTag {
    pub fn query() -> Query<SentenceTag> {
        Query::new()
    }
}

fn migrate_person(db: Arc<Db>) -> BoxFuture<'static, Result<()>> {
    Person::migrate(db)
}

fn migrate_book(db: Arc<Db>) -> BoxFuture<'static, Result<()>> {
    Book::migrate(db)
}

fn migrate_tag(db: Arc<Db>) -> BoxFuture<'static, Result<()>> {
    Tag::migrate(db)
}

fn migrate_sentence(db: Arc<Db>) -> BoxFuture<'static, Result<()>> {
    Sentence::migrate(db)
}

fn migrate_sentence_tag(db: Arc<Db>) -> BoxFuture<'static, Result<()>> {
    SentenceTag::migrate(db)
}

inventory::submit! { Migration(migrate_person) }
inventory::submit! { Migration(migrate_book) }
inventory::submit! { Migration(migrate_tag) }
inventory::submit! { Migration(migrate_sentence) }
inventory::submit! { Migration(migrate_sentence_tag) }
