//! End-to-end indexing + query scenario against a hand-built
//! `Posts.xml`/`Tags.xml` pair (spec §8 "End-to-end scenarios"), bypassing
//! the 7z/bzip2 archive formats themselves — those are covered by
//! `sevenz_rust2`'s and `parallel_bzip2`'s own test suites.

use std::sync::Arc;

use stackdex::archive::ArchiveReader;
use stackdex::indexer::Indexer;
use stackdex::query::QueryEngine;
use stackdex::store::IndexStore;

fn tags_xml() -> Vec<u8> {
    let mut bytes = b"<tags>\r\n".to_vec();
    bytes.extend_from_slice(b"<row Id=\"1\" TagName=\"python\" Count=\"10\"/>\r\n");
    bytes.extend_from_slice(b"<row Id=\"2\" TagName=\"rust\" Count=\"5\"/>\r\n");
    bytes.extend_from_slice(b"</tags>\r\n");
    bytes
}

fn posts_xml() -> Vec<u8> {
    let mut bytes = b"<posts>\r\n".to_vec();
    bytes.extend_from_slice(
        b"<row Id=\"10\" PostTypeId=\"1\" Score=\"7\" AcceptedAnswerId=\"11\" \
          Tags=\"&lt;python&gt;&lt;rust&gt;\"/>\r\n",
    );
    bytes.extend_from_slice(b"<row Id=\"11\" PostTypeId=\"2\" Score=\"3\" ParentId=\"10\"/>\r\n");
    bytes.extend_from_slice(b"</posts>\r\n");
    bytes
}

async fn build_indexer() -> (tempfile::TempDir, Arc<IndexStore>, Indexer, Arc<ArchiveReader>) {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(IndexStore::open(&dir.path().join("fixture.db")).await.unwrap());
    let tags_reader = Arc::new(ArchiveReader::from_bytes(tags_xml()));
    let posts_reader = Arc::new(ArchiveReader::from_bytes(posts_xml()));

    let indexer = Indexer::new(
        "fixture.com.7z".to_string(),
        Arc::clone(&tags_reader),
        Arc::clone(&posts_reader),
        Arc::clone(&store),
    );
    (dir, store, indexer, posts_reader)
}

#[tokio::test]
async fn tag_pass_then_post_pass_populate_the_store() {
    let (_dir, store, indexer, _posts_reader) = build_indexer().await;

    indexer.run_tag_pass().await.unwrap();
    let python_id = store.tags_by_name(&["python".to_string()]).await.unwrap();
    let rust_id = store.tags_by_name(&["rust".to_string()]).await.unwrap();
    assert_eq!(python_id, vec![1]);
    assert_eq!(rust_id, vec![2]);

    indexer.run_post_pass().await.unwrap();

    let question = store.question(10).await.unwrap().unwrap();
    assert_eq!(question.score, 7);
    assert_eq!(question.accepted_answer_id, Some(11));

    let answers = store.answers_for_question(10).await.unwrap();
    assert_eq!(answers.len(), 1);
    assert_eq!(answers[0].id, 11);
    assert_eq!(answers[0].question_id, 10);

    let tags = store.tags_for_question(10).await.unwrap();
    let mut tags_sorted = tags.clone();
    tags_sorted.sort();
    assert_eq!(tags_sorted, vec!["python".to_string(), "rust".to_string()]);
}

#[tokio::test]
async fn rerunning_an_unchanged_archive_is_a_no_op() {
    let (_dir, store, indexer, _posts_reader) = build_indexer().await;

    indexer.run_tag_pass().await.unwrap();
    indexer.run_post_pass().await.unwrap();

    let before = store.tags_page(0, 100).await.unwrap().len();
    let before_questions = store.question(10).await.unwrap();

    // Same archive bytes -> same digest -> both passes become no-ops.
    indexer.run_tag_pass().await.unwrap();
    indexer.run_post_pass().await.unwrap();

    let after = store.tags_page(0, 100).await.unwrap().len();
    let after_questions = store.question(10).await.unwrap();
    assert_eq!(before, after);
    assert_eq!(before_questions.unwrap().id, after_questions.unwrap().id);
}

#[tokio::test]
async fn get_post_promotes_accepted_answer_and_query_posts_filters_by_tag() {
    let (_dir, store, indexer, posts_reader) = build_indexer().await;
    indexer.run_tag_pass().await.unwrap();
    indexer.run_post_pass().await.unwrap();

    let engine = QueryEngine::new(posts_reader, store);

    let doc = engine.get_post(10).await.unwrap().unwrap();
    assert!(doc.accepted_answer.is_some());
    assert!(doc.answers.is_empty());
    assert_eq!(doc.fields.get("Score").unwrap(), "7");

    let hits = engine
        .query_posts(0, 10, &["python".to_string()])
        .await
        .unwrap();
    assert!(hits.contains_key(&10));

    let none = engine
        .query_posts(0, 10, &["python".to_string(), "c++".to_string()])
        .await
        .unwrap();
    assert!(none.is_empty());
}

#[tokio::test]
async fn missing_accepted_answer_yields_no_accepted_answer_key() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(IndexStore::open(&dir.path().join("fixture.db")).await.unwrap());

    let mut posts = b"<posts>\r\n".to_vec();
    posts.extend_from_slice(
        b"<row Id=\"20\" PostTypeId=\"1\" Score=\"1\" AcceptedAnswerId=\"999\"/>\r\n",
    );
    posts.extend_from_slice(b"</posts>\r\n");
    let posts_reader = Arc::new(ArchiveReader::from_bytes(posts));
    let tags_reader = Arc::new(ArchiveReader::from_bytes(tags_xml()));

    let indexer = Indexer::new(
        "orphaned.com.7z".to_string(),
        Arc::clone(&tags_reader),
        Arc::clone(&posts_reader),
        Arc::clone(&store),
    );
    indexer.run_tag_pass().await.unwrap();
    indexer.run_post_pass().await.unwrap();

    let engine = QueryEngine::new(posts_reader, store);
    let doc = engine.get_post(20).await.unwrap().unwrap();
    assert!(doc.accepted_answer.is_none());
    assert!(doc.answers.is_empty());
}
