use std::sync::Arc;
use templates::Error;
use templates::orm::{Db, FromRow, Model, Order, Query, auto_migrate};

async fn memory_db() -> Arc<Db> {
    Arc::new(Db::connect("sqlite::memory:").await.unwrap())
}

#[tokio::test]
async fn test_in_memory_db_keeps_one_connection_alive() {
    #[derive(Debug, FromRow, PartialEq, Eq)]
    struct Note {
        body: String,
    }

    let db = Db::connect(":memory:").await.unwrap();
    let options = db.pool().options();
    assert_eq!(options.get_max_connections(), 1);
    assert_eq!(options.get_min_connections(), 1);
    assert_eq!(options.get_idle_timeout(), None);
    assert_eq!(options.get_max_lifetime(), None);

    // Each call checks the connection out and back in; the data must survive.
    db.execute("CREATE TABLE note (body TEXT NOT NULL)").await.unwrap();
    db.execute("INSERT INTO note (body) VALUES ('kept')").await.unwrap();
    let notes: Vec<Note> = db.fetch_all("SELECT body FROM note").await.unwrap();
    assert_eq!(notes, vec![Note { body: "kept".to_string() }]);

    let failed = db.execute("INSERT INTO missing (x) VALUES (1)").await;
    assert!(matches!(failed, Err(Error::Database(_))));
}

#[tokio::test]
async fn test_auto_migrate_creates_every_table() {
    let db = memory_db().await;
    auto_migrate(db.clone()).await.unwrap();
    // Second run sees matching hashes and changes nothing.
    auto_migrate(db.clone()).await.unwrap();

    let tables: Vec<(String,)> = db
        .fetch_all("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
        .await
        .unwrap();
    let tables: Vec<String> = tables.into_iter().map(|(name,)| name).collect();
    for expected in ["book", "person", "sentence", "sentence_tag", "tag"] {
        assert!(tables.contains(&expected.to_string()), "missing {expected}");
    }

    let recorded: Vec<(String,)> = db
        .fetch_all("SELECT table_name FROM __templates_migrations")
        .await
        .unwrap();
    assert_eq!(recorded.len(), 5);
}

struct WidgetV1;

impl Model for WidgetV1 {
    fn table_name() -> &'static str {
        "widget"
    }

    fn create_table_sql() -> String {
        "CREATE TABLE IF NOT EXISTS widget (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT NOT NULL)"
            .to_string()
    }

    fn columns() -> Vec<(String, String)> {
        vec![
            ("id".to_string(), "INTEGER".to_string()),
            ("name".to_string(), "TEXT".to_string()),
        ]
    }
}

struct WidgetV2;

impl Model for WidgetV2 {
    fn table_name() -> &'static str {
        "widget"
    }

    fn create_table_sql() -> String {
        "CREATE TABLE IF NOT EXISTS widget (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT NOT NULL, color TEXT)"
            .to_string()
    }

    fn columns() -> Vec<(String, String)> {
        vec![
            ("id".to_string(), "INTEGER".to_string()),
            ("name".to_string(), "TEXT".to_string()),
            ("color".to_string(), "TEXT".to_string()),
        ]
    }
}

#[tokio::test]
async fn test_migrate_adds_missing_columns() {
    let db = memory_db().await;
    WidgetV1::migrate(db.clone()).await.unwrap();
    db.execute("INSERT INTO widget (name) VALUES ('bolt')")
        .await
        .unwrap();

    WidgetV2::migrate(db.clone()).await.unwrap();
    WidgetV2::migrate(db.clone()).await.unwrap();

    let columns: Vec<(String,)> = db
        .fetch_all("SELECT name FROM pragma_table_info('widget')")
        .await
        .unwrap();
    let columns: Vec<String> = columns.into_iter().map(|(name,)| name).collect();
    assert_eq!(columns, vec!["id", "name", "color"]);

    let rows: Vec<(String, Option<String>)> = db
        .fetch_all("SELECT name, color FROM widget")
        .await
        .unwrap();
    assert_eq!(rows, vec![("bolt".to_string(), None)]);
}

/// A table without a unique name, so one key can own several rows.
#[derive(Debug, Clone, PartialEq, FromRow)]
struct Score {
    id: i64,
    name: String,
    score: Option<i64>,
}

impl Model for Score {
    fn table_name() -> &'static str {
        "score"
    }

    fn create_table_sql() -> String {
        "CREATE TABLE IF NOT EXISTS score (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT NOT NULL, score INTEGER)"
            .to_string()
    }

    fn columns() -> Vec<(String, String)> {
        vec![
            ("id".to_string(), "INTEGER".to_string()),
            ("name".to_string(), "TEXT".to_string()),
            ("score".to_string(), "INTEGER".to_string()),
        ]
    }
}

async fn scores(rows: &[(&str, Option<i64>)]) -> Arc<Db> {
    let db = memory_db().await;
    Score::migrate(db.clone()).await.unwrap();
    for (name, score) in rows {
        sqlx::query("INSERT INTO score (name, score) VALUES (?, ?)")
            .bind(*name)
            .bind(*score)
            .execute(db.pool())
            .await
            .unwrap();
    }
    db
}

#[tokio::test]
async fn test_group_avg_one_row_per_key() {
    let db = scores(&[("a", Some(10)), ("a", Some(20)), ("b", Some(7))]).await;
    let mut session = db.session().await.unwrap();

    let avg: Vec<(String, Option<f64>)> = Query::<Score>::new()
        .group_avg("name", "score", session.conn())
        .await
        .unwrap();
    assert_eq!(
        avg,
        vec![("a".to_string(), Some(15.0)), ("b".to_string(), Some(7.0))]
    );

    let sums: Vec<(String, Option<i64>, i64)> = Query::<Score>::new()
        .group_sum_count("name", "score", session.conn())
        .await
        .unwrap();
    assert_eq!(
        sums,
        vec![("a".to_string(), Some(30), 2), ("b".to_string(), Some(7), 1)]
    );
}

#[tokio::test]
async fn test_avg_without_rows_is_none() {
    let db = scores(&[("a", Some(10))]).await;
    let mut session = db.session().await.unwrap();
    let avg = Query::<Score>::new()
        .filter_eq("name", "missing")
        .avg("score", session.conn())
        .await
        .unwrap();
    assert_eq!(avg, None);
}

#[tokio::test]
async fn test_first_and_all_on_no_match() {
    let db = scores(&[("a", Some(1))]).await;
    let mut session = db.session().await.unwrap();
    let query = Query::<Score>::new().filter_eq("name", "nobody");

    assert_eq!(query.first(session.conn()).await.unwrap(), None);
    assert!(query.all(session.conn()).await.unwrap().is_empty());
    assert_eq!(query.count(session.conn()).await.unwrap(), 0);
}

#[tokio::test]
async fn test_order_limit_and_reuse() {
    let db = scores(&[("a", Some(1)), ("a", Some(3)), ("a", Some(2)), ("b", Some(9))]).await;
    let mut session = db.session().await.unwrap();
    let base = Query::<Score>::new().filter_eq("name", "a");

    let top: Vec<i64> = base
        .clone()
        .order_by("score", Order::Desc)
        .limit(2)
        .all(session.conn())
        .await
        .unwrap()
        .into_iter()
        .filter_map(|s| s.score)
        .collect();
    assert_eq!(top, vec![3, 2]);

    let lowest = base
        .order_by("score", Order::Asc)
        .first(session.conn())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(lowest.score, Some(1));
}

#[tokio::test]
async fn test_filter_in_and_null() {
    let db = scores(&[("a", Some(1)), ("b", None), ("c", Some(3))]).await;
    let mut session = db.session().await.unwrap();

    let picked = Query::<Score>::new()
        .filter_in("name", ["a", "c", "zzz"])
        .order_by("name", Order::Asc)
        .all(session.conn())
        .await
        .unwrap();
    let names: Vec<&str> = picked.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["a", "c"]);

    let none: Vec<Score> = Query::<Score>::new()
        .filter_in("name", Vec::<String>::new())
        .all(session.conn())
        .await
        .unwrap();
    assert!(none.is_empty());

    let unscored = Query::<Score>::new()
        .filter_eq("score", None::<i64>)
        .all(session.conn())
        .await
        .unwrap();
    assert_eq!(unscored.len(), 1);
    assert_eq!(unscored[0].name, "b");

    let counted = Query::<Score>::new()
        .count_column("score", session.conn())
        .await
        .unwrap();
    assert_eq!(counted, 2);
}

#[tokio::test]
async fn test_unknown_column_is_rejected_at_execution() {
    let db = scores(&[]).await;
    let mut session = db.session().await.unwrap();
    // Building the query is fine; running it is not.
    let query = Query::<Score>::new().filter_eq("colour", "red");
    let err = query.all(session.conn()).await.unwrap_err();
    assert!(matches!(
        err,
        Error::UnknownColumn { table: "score", ref column } if column == "colour"
    ));

    let err = Query::<Score>::new()
        .order_by("nope", Order::Asc)
        .first(session.conn())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::UnknownColumn { .. }));
}

#[tokio::test]
async fn test_session_rolls_back_unless_committed() {
    let db = scores(&[]).await;

    {
        let mut session = db.session().await.unwrap();
        sqlx::query("INSERT INTO score (name, score) VALUES ('dropped', 1)")
            .execute(session.conn())
            .await
            .unwrap();
    }

    let mut session = db.session().await.unwrap();
    sqlx::query("INSERT INTO score (name, score) VALUES ('kept', 2)")
        .execute(session.conn())
        .await
        .unwrap();
    session.commit().await.unwrap();

    let rows: Vec<(String,)> = db.fetch_all("SELECT name FROM score").await.unwrap();
    assert_eq!(rows, vec![("kept".to_string(),)]);
}
