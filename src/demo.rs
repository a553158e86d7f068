//! The ORM walkthrough, one scenario per function.
//!
//! Every scenario opens its own session, logs what it finds and returns it,
//! committing only when it changed something.

use crate::error::Result;
use crate::models::{Book, NewBook, NewPerson, Person, Sentence};
use crate::orm::{auto_migrate, Db, Order};
use clap::ValueEnum;
use log::info;
use std::sync::Arc;

/// Scenario names accepted by the `orm-demo` binary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Scenario {
    CreateTables,
    InsertData,
    QueryData,
    QueryFirst,
    QueryAll,
    QueryIn,
    ShortQuery,
    QueryAverage,
    QueryAverageByGroup,
    QueryWithFilter,
    ManyToMany,
    Count,
    EmptyField,
}

/// What the entry point ran when no scenario is named.
pub const DEFAULT_SCENARIOS: &[Scenario] = &[Scenario::CreateTables, Scenario::EmptyField];

pub async fn run_scenario(db: Arc<Db>, scenario: Scenario) -> Result<()> {
    info!("Running scenario {:?}", scenario);
    match scenario {
        Scenario::CreateTables => create_tables(db).await,
        Scenario::InsertData => insert_data(&db).await.map(drop),
        Scenario::QueryData => query_data(&db).await.map(drop),
        Scenario::QueryFirst => query_first(&db, "zhongwei2").await.map(drop),
        Scenario::QueryAll => query_all(&db, "zhongwei2").await.map(drop),
        Scenario::QueryIn => query_in(&db, &["zhongwei", "qq"]).await.map(drop),
        Scenario::ShortQuery => short_query(&db).await.map(drop),
        Scenario::QueryAverage => query_average(&db, "zhongwei").await.map(drop),
        Scenario::QueryAverageByGroup => query_average_by_group(&db).await.map(drop),
        Scenario::QueryWithFilter => query_with_filter(&db).await.map(drop),
        Scenario::ManyToMany => many_to_many(&db).await.map(drop),
        Scenario::Count => count(&db).await.map(drop),
        Scenario::EmptyField => empty_field(&db).await.map(drop),
    }
}

pub async fn create_tables(db: Arc<Db>) -> Result<()> {
    auto_migrate(db).await
}

/// Three people, each in its own committed session.
pub async fn insert_data(db: &Db) -> Result<Vec<Person>> {
    let mut inserted = Vec::new();
    for person in [
        NewPerson::new("zhongwei", true).score(100),
        NewPerson::new("zhongwei2", true).score(200),
        NewPerson::new("qq", true).score(200),
    ] {
        let mut session = db.session().await?;
        let person = person.insert(session.conn()).await?;
        session.commit().await?;
        info!("Inserted {}", person);
        inserted.push(person);
    }
    Ok(inserted)
}

/// Flip `is_man` on the oldest "zhongwei" and list all of them newest first.
pub async fn query_data(db: &Db) -> Result<(Option<Person>, Vec<Person>)> {
    let mut session = db.session().await?;
    let mut person = Person::query()
        .filter_eq("name", "zhongwei")
        .order_by("created_at", Order::Asc)
        .first(session.conn())
        .await?;
    if let Some(person) = person.as_mut() {
        info!("{}", person);
        info!("join_date is a {}", std::any::type_name_of_val(&person.join_date));
        person.is_man = false;
        person.save(session.conn()).await?;
    }

    let persons = Person::query()
        .filter_eq("name", "zhongwei")
        .order_by("created_at", Order::Desc)
        .all(session.conn())
        .await?;
    session.commit().await?;
    for p in &persons {
        info!("{}", p);
    }
    Ok((person, persons))
}

/// `first` with no match yields `None`.
pub async fn query_first(db: &Db, name: &str) -> Result<Option<Person>> {
    let mut session = db.session().await?;
    let person = Person::query()
        .filter_eq("name", name)
        .order_by("created_at", Order::Asc)
        .first(session.conn())
        .await?;
    match &person {
        Some(p) => info!("query first: {}", p),
        None => info!("query first: None"),
    }
    Ok(person)
}

/// `all` with no match yields an empty list.
pub async fn query_all(db: &Db, name: &str) -> Result<Vec<Person>> {
    let mut session = db.session().await?;
    let persons = Person::query()
        .filter_eq("name", name)
        .order_by("created_at", Order::Asc)
        .all(session.conn())
        .await?;
    info!("query all: {} rows", persons.len());
    Ok(persons)
}

pub async fn query_in(db: &Db, names: &[&str]) -> Result<Vec<Person>> {
    let mut session = db.session().await?;
    let persons = Person::query()
        .filter_in("name", names.iter().copied())
        .all(session.conn())
        .await?;
    info!("query in {:?}:", names);
    for p in &persons {
        info!("  {}", p);
    }
    Ok(persons)
}

/// One base query reused for two different lookups.
pub async fn short_query(db: &Db) -> Result<(Option<Person>, Vec<Person>)> {
    let mut session = db.session().await?;
    let query = Person::query().filter_eq("name", "zhongwei");

    let one = query
        .clone()
        .filter_eq("is_man", true)
        .first(session.conn())
        .await?;
    match &one {
        Some(p) => info!("get one: {}", p),
        None => info!("get one: None"),
    }

    let some = query
        .order_by("created_at", Order::Desc)
        .limit(3)
        .all(session.conn())
        .await?;
    info!("get some: {} rows", some.len());
    Ok((one, some))
}

pub async fn query_average(db: &Db, name: &str) -> Result<Option<f64>> {
    let mut session = db.session().await?;
    let avg = Person::query()
        .filter_eq("name", name)
        .avg("score", session.conn())
        .await?;
    match avg {
        Some(avg) => info!("avg is: {}", avg),
        None => info!("No result found!"),
    }
    Ok(avg)
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupReport {
    pub avg_by_name: Vec<(String, Option<f64>)>,
    pub avg_by_name_not_men: Vec<(String, Option<f64>)>,
    pub sum_count_by_name: Vec<(String, Option<i64>, i64)>,
}

pub async fn query_average_by_group(db: &Db) -> Result<GroupReport> {
    let mut session = db.session().await?;
    let avg_by_name = Person::query()
        .group_avg("name", "score", session.conn())
        .await?;
    info!("avg by name: {:?}", avg_by_name);

    let avg_by_name_not_men = Person::query()
        .filter_eq("is_man", false)
        .group_avg("name", "score", session.conn())
        .await?;
    info!("avg by name where not is_man: {:?}", avg_by_name_not_men);

    let sum_count_by_name = Person::query()
        .group_sum_count("name", "score", session.conn())
        .await?;
    info!("sum and count by name: {:?}", sum_count_by_name);

    Ok(GroupReport {
        avg_by_name,
        avg_by_name_not_men,
        sum_count_by_name,
    })
}

/// "zhongwei" rows split by `is_man`.
pub async fn query_with_filter(db: &Db) -> Result<(Vec<Person>, Vec<Person>)> {
    let mut session = db.session().await?;
    let base = Person::query().filter_eq("name", "zhongwei");
    let men = base.clone().filter_eq("is_man", true).all(session.conn()).await?;
    let others = base.filter_eq("is_man", false).all(session.conn()).await?;
    for p in men.iter().chain(&others) {
        info!("{}", p);
    }
    Ok((men, others))
}

pub async fn many_to_many(db: &Db) -> Result<String> {
    let mut session = db.session().await?;
    let sentence = Sentence::create(session.conn(), "Hello world!").await?;
    session.commit().await?;

    let mut session = db.session().await?;
    sentence.set_tags(session.conn(), ["test", "test2"]).await?;
    let description = sentence.describe(session.conn()).await?;
    session.commit().await?;
    info!("{}", description);
    Ok(description)
}

/// Row count taken two ways: over the filtered query and as `COUNT(id)`.
pub async fn count(db: &Db) -> Result<(i64, i64)> {
    let mut session = db.session().await?;
    let total = Person::query().count(session.conn()).await?;
    let by_id = Person::query().count_column("id", session.conn()).await?;
    info!("count: {} / {}", total, by_id);
    Ok((total, by_id))
}

/// A book stored without content reads back with `content == None`.
pub async fn empty_field(db: &Db) -> Result<Option<Book>> {
    let mut session = db.session().await?;
    NewBook::new("heart").insert(session.conn()).await?;
    session.commit().await?;

    let mut session = db.session().await?;
    let book = Book::query().first(session.conn()).await?;
    if let Some(book) = &book {
        info!("{} {:?}", book.name, book.content);
    }
    Ok(book)
}
