use std::sync::Arc;
use std::time::Duration;
use templates::demo;
use templates::models::{Book, NewBook, NewPerson, Person, Sentence, SentenceTag, Tag};
use templates::orm::Db;

async fn setup() -> Arc<Db> {
    let db = Arc::new(Db::connect("sqlite::memory:").await.unwrap());
    demo::create_tables(db.clone()).await.unwrap();
    db
}

async fn seeded() -> Arc<Db> {
    let db = setup().await;
    demo::insert_data(&db).await.unwrap();
    db
}

#[tokio::test]
async fn test_query_first_and_all_with_no_data() {
    let db = setup().await;
    assert_eq!(demo::query_first(&db, "zhongwei2").await.unwrap(), None);
    assert!(demo::query_all(&db, "zhongwei2").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_insert_data_and_lookup() {
    let db = seeded().await;
    let found = demo::query_first(&db, "zhongwei2").await.unwrap().unwrap();
    assert_eq!(found.score, Some(200));
    assert!(found.is_man);
    assert!(found.join_date.is_some());

    let both = demo::query_in(&db, &["zhongwei", "qq"]).await.unwrap();
    let mut names: Vec<String> = both.into_iter().map(|p| p.name).collect();
    names.sort();
    assert_eq!(names, vec!["qq", "zhongwei"]);

    assert_eq!(demo::count(&db).await.unwrap(), (3, 3));
}

#[tokio::test]
async fn test_duplicate_person_name_is_rejected() {
    let db = seeded().await;
    let mut session = db.session().await.unwrap();
    let err = NewPerson::new("qq", false).insert(session.conn()).await;
    assert!(err.is_err());
}

#[tokio::test]
async fn test_each_person_gets_its_own_timestamps() {
    let db = setup().await;
    let mut session = db.session().await.unwrap();
    let first = NewPerson::new("early", true).insert(session.conn()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    let second = NewPerson::new("late", true).insert(session.conn()).await.unwrap();
    session.commit().await.unwrap();

    assert!(second.created_at > first.created_at);

    let mut session = db.session().await.unwrap();
    let newest = Person::query()
        .order_by("created_at", templates::orm::Order::Desc)
        .first(session.conn())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(newest.name, "late");
}

#[tokio::test]
async fn test_query_data_flips_flag_and_save_stamps_update() {
    let db = seeded().await;
    let (updated, all) = demo::query_data(&db).await.unwrap();
    let updated = updated.unwrap();
    assert!(!updated.is_man);
    assert!(updated.updated_at >= updated.created_at);
    assert_eq!(all.len(), 1);
    assert!(!all[0].is_man);

    let (men, others) = demo::query_with_filter(&db).await.unwrap();
    assert!(men.is_empty());
    assert_eq!(others.len(), 1);
}

#[tokio::test]
async fn test_short_query_reuses_base() {
    let db = seeded().await;
    let (one, some) = demo::short_query(&db).await.unwrap();
    assert_eq!(one.unwrap().name, "zhongwei");
    assert_eq!(some.len(), 1);
}

#[tokio::test]
async fn test_averages() {
    let db = seeded().await;
    assert_eq!(demo::query_average(&db, "zhongwei").await.unwrap(), Some(100.0));
    assert_eq!(demo::query_average(&db, "nobody").await.unwrap(), None);

    let report = demo::query_average_by_group(&db).await.unwrap();
    assert_eq!(
        report.avg_by_name,
        vec![
            ("qq".to_string(), Some(200.0)),
            ("zhongwei".to_string(), Some(100.0)),
            ("zhongwei2".to_string(), Some(200.0)),
        ]
    );
    assert!(report.avg_by_name_not_men.is_empty());
    assert_eq!(report.sum_count_by_name[1], ("zhongwei".to_string(), Some(100), 1));
}

#[tokio::test]
async fn test_empty_field_reads_back_as_none() {
    let db = setup().await;
    let book = demo::empty_field(&db).await.unwrap().unwrap();
    assert_eq!(book.name, "heart");
    assert_eq!(book.content, None);

    let mut session = db.session().await.unwrap();
    let filled = NewBook::new("mind")
        .content("full")
        .insert(session.conn())
        .await
        .unwrap();
    let read = Book::query()
        .filter_eq("id", filled.id)
        .first(session.conn())
        .await
        .unwrap();
    assert_eq!(read, Some(filled));
}

#[tokio::test]
async fn test_many_to_many_description() {
    let db = setup().await;
    let description = demo::many_to_many(&db).await.unwrap();
    assert_eq!(
        description,
        r#"id: 1, content: Hello world!, tags: ["test", "test2"]"#
    );
}

#[tokio::test]
async fn test_set_tags_reuses_existing_and_creates_new_once() {
    let db = setup().await;
    let mut session = db.session().await.unwrap();
    let conn = session.conn();

    let first = Sentence::create(conn, "one").await.unwrap();
    let second = Sentence::create(conn, "two").await.unwrap();

    first.set_tags(conn, ["x", "y"]).await.unwrap();
    assert_eq!(Tag::query().count(conn).await.unwrap(), 2);

    second.set_tags(conn, ["y", "z"]).await.unwrap();
    assert_eq!(Tag::query().count(conn).await.unwrap(), 3);

    // Replaying the same names creates nothing and leaves one link per name.
    second.set_tags(conn, ["y", "z"]).await.unwrap();
    assert_eq!(Tag::query().count(conn).await.unwrap(), 3);
    assert_eq!(second.tag_names(conn).await.unwrap(), vec!["y", "z"]);

    // Replacing drops old links.
    first.set_tags(conn, ["z", "z"]).await.unwrap();
    assert_eq!(first.tag_names(conn).await.unwrap(), vec!["z"]);
    assert_eq!(Tag::query().count(conn).await.unwrap(), 3);
    assert_eq!(
        SentenceTag::query()
            .filter_eq("sentence_id", first.id)
            .count(conn)
            .await
            .unwrap(),
        1
    );

    let z = Tag::find_or_create(conn, "z").await.unwrap();
    let tagged: Vec<String> = z
        .sentences(conn)
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.content)
        .collect();
    assert_eq!(tagged, vec!["two", "one"]);

    first.set_tags(conn, Vec::<String>::new()).await.unwrap();
    assert!(first.tags(conn).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_person_display() {
    let db = setup().await;
    let mut session = db.session().await.unwrap();
    let person = NewPerson::new("qq", true).insert(session.conn()).await.unwrap();
    let shown = person.to_string();
    assert!(shown.starts_with("<Person('qq', 'True', 'None', '"), "{shown}");
    assert!(shown.ends_with("')>"));

    let woman = NewPerson::new("mm", false).insert(session.conn()).await.unwrap();
    assert!(woman.to_string().starts_with("<Person('mm', 'False', 'None', '"));
}
