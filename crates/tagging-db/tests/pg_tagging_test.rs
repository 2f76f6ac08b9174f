//! PostgreSQL integration tests for the tagging repository.
//!
//! These need a reachable PostgreSQL server: set `DATABASE_URL` or start
//! the local test database on port 15432, then run with `--ignored`.

use tagging_db::test_fixtures::TestDatabase;
use tagging_db::{
    AssociationRepository, Distribution, EntityRef, Error, QueryParam, SqlFilter, TagRepository,
    TagSelector, TagUsage, UsageFilter, UsageQuery,
};

fn parrot(id: i64) -> EntityRef {
    EntityRef::new("parrot", id)
}

fn link(id: i64) -> EntityRef {
    EntityRef::new("link", id)
}

fn usage_view(usage: &[TagUsage]) -> Vec<(String, Option<i64>)> {
    usage
        .iter()
        .map(|u| (u.name().to_string(), u.count))
        .collect()
}

async fn setup() -> TestDatabase {
    let _ = dotenvy::dotenv();
    TestDatabase::new().await
}

async fn tag_parrots(test_db: &TestDatabase) -> tagging_db::Tagging<tagging_db::PgTaggingRepository> {
    let tagging = test_db.engine(&["parrot", "link"]);
    for (id, tags) in [(1, "foo bar"), (2, "bar baz ter"), (3, "foo ter"), (4, "bar ter")] {
        tagging
            .update_tags(&parrot(id), Some(tags))
            .await
            .expect("Failed to tag parrot");
    }
    tagging
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL or local test database
async fn test_update_tags_reconciles() {
    let test_db = setup().await;
    let tagging = tag_parrots(&test_db).await;

    let diff = tagging
        .update_tags(&parrot(2), Some("bar, qux"))
        .await
        .unwrap();
    let mut removed: Vec<String> = diff.removed.into_iter().map(|t| t.name).collect();
    removed.sort();
    assert_eq!(removed, vec!["baz", "ter"]);
    assert_eq!(diff.added, vec!["qux".to_string()]);

    let names: Vec<String> = tagging
        .tags_for(&parrot(2))
        .await
        .unwrap()
        .into_iter()
        .map(|t| t.name)
        .collect();
    assert_eq!(names, vec!["bar", "qux"]);

    let again = tagging
        .update_tags(&parrot(2), Some("qux bar"))
        .await
        .unwrap();
    assert!(again.is_empty());

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL or local test database
async fn test_usage_and_related_tags() {
    let test_db = setup().await;
    let tagging = tag_parrots(&test_db).await;

    let usage = tagging
        .usage_for_kind("parrot", &UsageQuery::new().with_counts())
        .await
        .unwrap();
    assert_eq!(
        usage_view(&usage),
        vec![
            ("bar".to_string(), Some(3)),
            ("baz".to_string(), Some(1)),
            ("foo".to_string(), Some(2)),
            ("ter".to_string(), Some(3)),
        ]
    );

    let usage = tagging
        .usage_for_kind("parrot", &UsageQuery::new().min_count(3))
        .await
        .unwrap();
    assert_eq!(
        usage_view(&usage),
        vec![("bar".to_string(), Some(3)), ("ter".to_string(), Some(3))]
    );

    let related = tagging
        .related_tags(&TagSelector::from("bar"), "parrot", true, None)
        .await
        .unwrap();
    assert_eq!(
        usage_view(&related),
        vec![
            ("baz".to_string(), Some(1)),
            ("foo".to_string(), Some(1)),
            ("ter".to_string(), Some(2)),
        ]
    );

    let related = tagging
        .related_tags(&TagSelector::parse("bar ter baz"), "parrot", true, None)
        .await
        .unwrap();
    assert!(related.is_empty());

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL or local test database
async fn test_usage_filters() {
    let test_db = setup().await;
    let tagging = tag_parrots(&test_db).await;

    let by_ids = UsageQuery::new()
        .with_counts()
        .filter(UsageFilter::Entities(vec![1, 3]));
    let usage = tagging.usage_for_kind("parrot", &by_ids).await.unwrap();
    assert_eq!(
        usage_view(&usage),
        vec![
            ("bar".to_string(), Some(1)),
            ("foo".to_string(), Some(2)),
            ("ter".to_string(), Some(1)),
        ]
    );

    let by_sql = UsageQuery::new().min_count(2).filter(UsageFilter::Sql(SqlFilter::new(
        "ti.entity_id >= $1",
        vec![QueryParam::Int(2)],
    )));
    let usage = tagging.usage_for_kind("parrot", &by_sql).await.unwrap();
    assert_eq!(
        usage_view(&usage),
        vec![("bar".to_string(), Some(2)), ("ter".to_string(), Some(3))]
    );

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL or local test database
async fn test_intersection_union_and_cloud() {
    let test_db = setup().await;
    let tagging = tag_parrots(&test_db).await;

    let both = tagging
        .entities_with_all("parrot", &TagSelector::parse("bar ter"))
        .await
        .unwrap();
    assert_eq!(both, vec![parrot(2), parrot(4)]);

    let either = tagging
        .entities_with_any("parrot", &TagSelector::parse("foo, ter"))
        .await
        .unwrap();
    assert_eq!(either.len(), 4);

    let cloud = tagging
        .cloud_for_kind("parrot", 4, Distribution::Linear, &UsageQuery::new())
        .await
        .unwrap();
    let sizes: Vec<u32> = cloud.iter().map(|c| c.font_size).collect();
    assert_eq!(sizes, vec![4, 1, 2, 4]);

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL or local test database
async fn test_related_entities() {
    let test_db = setup().await;
    let tagging = test_db.engine(&["link", "article"]);
    tagging
        .update_tags(&link(1), Some("tag1 tag2 tag3 tag4 tag5"))
        .await
        .unwrap();
    tagging.update_tags(&link(2), Some("tag1 tag2 tag3")).await.unwrap();
    tagging.update_tags(&link(3), Some("tag1")).await.unwrap();

    assert_eq!(
        tagging.related_entities(&link(1), "link", None).await.unwrap(),
        vec![link(2), link(3)]
    );
    assert_eq!(
        tagging.related_entities(&link(1), "link", Some(1)).await.unwrap(),
        vec![link(2)]
    );
    assert!(tagging
        .related_entities(&link(4), "link", None)
        .await
        .unwrap()
        .is_empty());

    let article = EntityRef::new("article", 1);
    tagging
        .update_tags(&article, Some("tag1 tag2 tag3 tag4"))
        .await
        .unwrap();
    assert_eq!(
        tagging.related_entities(&article, "link", None).await.unwrap(),
        vec![link(1), link(2), link(3)]
    );

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL or local test database
async fn test_delete_tag_cascades() {
    let test_db = setup().await;
    let tagging = tag_parrots(&test_db).await;

    tagging.delete_tag("ter").await.unwrap();
    assert!(tagging.find_tag("ter").await.unwrap().is_none());
    assert!(tagging
        .entities_for_tag("ter", "parrot")
        .await
        .unwrap()
        .is_empty());
    assert!(matches!(
        tagging.delete_tag("ter").await,
        Err(Error::NotFound(_))
    ));

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL or local test database
async fn test_link_unknown_tag_is_not_found() {
    let test_db = setup().await;
    let err = test_db.repo.link(987_654, &parrot(1)).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));

    test_db.cleanup().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore] // Requires DATABASE_URL or local test database
async fn test_concurrent_get_or_create_yields_one_row() {
    let test_db = setup().await;

    let mut handles = Vec::new();
    for _ in 0..16 {
        let repo = test_db.repo.clone();
        handles.push(tokio::spawn(async move { repo.get_or_create("shared").await }));
    }
    let mut ids = Vec::new();
    let mut created = 0;
    for handle in handles {
        let (tag, was_created) = handle.await.unwrap().unwrap();
        ids.push(tag.id);
        if was_created {
            created += 1;
        }
    }
    ids.dedup();
    assert_eq!(ids.len(), 1);
    assert_eq!(created, 1);

    test_db.cleanup().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore] // Requires DATABASE_URL or local test database
async fn test_concurrent_updates_of_one_entity_serialize() {
    let test_db = setup().await;
    let tagging = test_db.engine(&["parrot"]);

    let inputs = ["a b", "b c", "c d", "d e"];
    let mut handles = Vec::new();
    for input in inputs {
        let tagging = tagging.clone();
        handles.push(tokio::spawn(async move {
            tagging.update_tags(&parrot(1), Some(input)).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let names: Vec<String> = tagging
        .tags_for(&parrot(1))
        .await
        .unwrap()
        .into_iter()
        .map(|t| t.name)
        .collect();
    assert_eq!(names.len(), 2);
    assert!(inputs.contains(&names.join(" ").as_str()));

    test_db.cleanup().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore] // Requires DATABASE_URL or local test database
async fn test_concurrent_new_tags_in_opposite_orders() {
    let test_db = setup().await;
    let tagging = test_db.engine(&["parrot"]);

    for round in 0..10 {
        let names: Vec<String> = (0..30).map(|i| format!("r{}t{}", round, i)).collect();
        let forward = names.join(" ");
        let backward = names.iter().rev().cloned().collect::<Vec<_>>().join(" ");

        let first = {
            let tagging = tagging.clone();
            tokio::spawn(async move { tagging.update_tags(&parrot(1), Some(forward.as_str())).await })
        };
        let second = {
            let tagging = tagging.clone();
            tokio::spawn(async move { tagging.update_tags(&parrot(2), Some(backward.as_str())).await })
        };
        first.await.unwrap().expect("Forward update failed");
        second.await.unwrap().expect("Backward update failed");

        for id in [1, 2] {
            assert_eq!(tagging.tags_for(&parrot(id)).await.unwrap().len(), 30);
        }
    }
    assert_eq!(tagging.list_tags().await.unwrap().len(), 300);

    test_db.cleanup().await;
}
