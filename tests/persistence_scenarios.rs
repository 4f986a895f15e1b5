use std::collections::HashMap;
use std::fs;
use std::io::Cursor;
use std::sync::Arc;

use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use quiver::collection::Collection;
use quiver::collection::document::{AddDocuments, DocumentInput};
use quiver::collection::filter::QueryFilter;
use quiver::collection::query::QueryRequest;
use quiver::config::DatabaseConfig;
use quiver::database::Database;
use quiver::embedding::embedder::EmbedderRef;
use quiver::embedding::function::FnEmbedder;
use quiver::error::{QuiverError, Result};
use quiver::persist::layout::{METADATA_FILE_NAME, hash_hex};

fn letter_embedder() -> EmbedderRef {
    Arc::new(FnEmbedder::new("letters", |text: &str| {
        Ok(vec![
            text.matches('h').count() as f32 + 0.1,
            text.matches('w').count() as f32 + 0.1,
            text.matches('o').count() as f32 + 0.1,
        ])
    }))
}

async fn populate(db: &Database) -> Result<()> {
    let mut collection_meta = HashMap::new();
    collection_meta.insert("owner".to_string(), "tests".to_string());
    let collection = db.create_collection("greetings", collection_meta, Some(letter_embedder()))?;

    let mut source_a = HashMap::new();
    source_a.insert("source".to_string(), "a".to_string());
    let mut source_b = HashMap::new();
    source_b.insert("source".to_string(), "b".to_string());
    collection
        .add(
            AddDocuments::new(vec!["d1".into(), "d2".into()])
                .metadatas(vec![source_a, source_b])
                .contents(vec!["hello".into(), "world".into()]),
            &CancellationToken::new(),
        )
        .await
}

#[tokio::test]
async fn persistent_round_trip_restores_documents() -> Result<()> {
    let root = TempDir::new()?;
    {
        let db = Database::open(root.path())?;
        populate(&db).await?;
    }

    let db = Database::open(root.path())?;
    let collection = db
        .get_collection("greetings", Some(letter_embedder()))
        .expect("collection reloaded");
    assert_eq!(collection.count(), 2);
    assert_eq!(collection.dimension(), Some(3));
    assert_eq!(collection.metadata()["owner"], "tests");

    let d1 = collection.get("d1").expect("d1 reloaded");
    assert_eq!(d1.content.as_deref(), Some("hello"));
    assert_eq!(d1.metadata["source"], "a");
    let d2 = collection.get("d2").expect("d2 reloaded");
    assert_eq!(d2.content.as_deref(), Some("world"));
    assert_eq!(d2.metadata["source"], "b");

    let results = collection
        .query(
            QueryRequest::text("hello").n_results(1),
            &CancellationToken::new(),
        )
        .await?;
    assert_eq!(results[0].id, "d1");
    Ok(())
}

#[tokio::test]
async fn persistent_round_trip_keeps_exact_vectors() -> Result<()> {
    let root = TempDir::new()?;
    {
        let db = Database::open(root.path())?;
        let collection = db.create_collection("vectors", HashMap::new(), None)?;
        collection
            .add(
                AddDocuments::new(vec!["d1".into(), "d2".into()])
                    .embeddings(vec![vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0]])
                    .contents(vec!["hello".into(), "world".into()]),
                &CancellationToken::new(),
            )
            .await?;
    }

    let db = Database::open(root.path())?;
    let collection = db.get_collection("vectors", None).expect("collection reloaded");
    let d1 = collection.get("d1").expect("d1 reloaded");
    assert_eq!(d1.embedding, vec![1.0, 0.0, 0.0]);
    assert_eq!(d1.content.as_deref(), Some("hello"));
    let d2 = collection.get("d2").expect("d2 reloaded");
    assert_eq!(d2.embedding, vec![0.0, 1.0, 0.0]);
    assert_eq!(d2.content.as_deref(), Some("world"));

    let results = collection
        .query(
            QueryRequest::embedding(vec![0.0, 1.0, 0.0]).n_results(2),
            &CancellationToken::new(),
        )
        .await?;
    assert_eq!(results[0].id, "d2");
    assert_eq!(results[0].similarity, 1.0);
    Ok(())
}

#[tokio::test]
async fn create_replaces_a_persisted_collection() -> Result<()> {
    let root = TempDir::new()?;
    {
        let db = Database::open(root.path())?;
        populate(&db).await?;
        let mut metadata = HashMap::new();
        metadata.insert("owner".to_string(), "replacement".to_string());
        let replaced = db.create_collection("greetings", metadata, None)?;
        assert_eq!(replaced.count(), 0);
    }

    let db = Database::open(root.path())?;
    let collection = db.get_collection("greetings", None).expect("collection reloaded");
    assert_eq!(collection.count(), 0);
    assert_eq!(collection.metadata()["owner"], "replacement");
    Ok(())
}

#[tokio::test]
async fn new_collection_over_old_directory_starts_empty() -> Result<()> {
    let root = TempDir::new()?;
    {
        let db = Database::open(root.path())?;
        populate(&db).await?;
    }

    let fresh = Collection::new("greetings", HashMap::new(), None, Some(root.path()))?;
    assert_eq!(fresh.count(), 0);
    let dir = root.path().join(hash_hex("greetings"));
    assert!(!dir.join(format!("{}.qvr", hash_hex("d1"))).exists());

    let db = Database::open(root.path())?;
    let collection = db.get_collection("greetings", None).expect("collection reloaded");
    assert_eq!(collection.count(), 0);
    assert!(collection.metadata().is_empty());
    Ok(())
}

#[tokio::test]
async fn layout_uses_hashed_names() -> Result<()> {
    let root = TempDir::new()?;
    let db = Database::open(root.path())?;
    populate(&db).await?;

    let dir = root.path().join(hash_hex("greetings"));
    assert!(dir.join(METADATA_FILE_NAME).is_file());
    assert!(dir.join(format!("{}.qvr", hash_hex("d1"))).is_file());
    assert!(dir.join(format!("{}.qvr", hash_hex("d2"))).is_file());

    let collection = db.get_collection("greetings", None).expect("exists");
    assert_eq!(collection.persist_directory(), Some(dir.as_path()));
    Ok(())
}

#[tokio::test]
async fn load_ignores_stray_files_and_temp_leftovers() -> Result<()> {
    let root = TempDir::new()?;
    {
        let db = Database::open(root.path())?;
        populate(&db).await?;
    }
    let dir = root.path().join(hash_hex("greetings"));
    fs::write(dir.join("notes.txt"), b"not a record")?;
    fs::write(
        dir.join(format!("{}.qvr.3f2a.tmp", hash_hex("d3"))),
        b"half written",
    )?;
    fs::create_dir_all(dir.join("nested"))?;
    fs::write(root.path().join("README"), b"top level file")?;
    fs::create_dir_all(root.path().join("empty-dir"))?;

    let db = Database::open(root.path())?;
    let collections = db.list_collections();
    assert_eq!(collections.len(), 1);
    assert_eq!(collections["greetings"].count(), 2);
    Ok(())
}

#[tokio::test]
async fn corrupt_record_fails_the_load() -> Result<()> {
    let root = TempDir::new()?;
    {
        let db = Database::open(root.path())?;
        populate(&db).await?;
    }
    let record = root
        .path()
        .join(hash_hex("greetings"))
        .join(format!("{}.qvr", hash_hex("d1")));
    let mut bytes = fs::read(&record)?;
    let last = bytes.len() - 1;
    bytes[last] ^= 0x5a;
    fs::write(&record, bytes)?;

    let err = Database::open(root.path()).unwrap_err();
    assert!(matches!(err, QuiverError::Persistence(_)));
    Ok(())
}

#[tokio::test]
async fn duplicate_recorded_names_fail_the_load() -> Result<()> {
    let root = TempDir::new()?;
    {
        let db = Database::open(root.path())?;
        populate(&db).await?;
    }
    let first = root.path().join(hash_hex("greetings"));
    let copy = root.path().join("copied-by-hand");
    fs::create_dir_all(&copy)?;
    fs::copy(first.join(METADATA_FILE_NAME), copy.join(METADATA_FILE_NAME))?;

    match Database::open(root.path()) {
        Err(QuiverError::Persistence(msg)) => {
            assert!(msg.contains("greetings"));
            assert!(msg.contains("copied-by-hand"));
        }
        other => panic!("expected a persistence error, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn deletes_reach_the_disk() -> Result<()> {
    let root = TempDir::new()?;
    {
        let db = Database::open(root.path())?;
        populate(&db).await?;
        let collection = db.get_collection("greetings", None).expect("exists");
        collection.delete("d2")?;
        collection.delete("missing")?;
        let removed = collection.delete_where(&QueryFilter::new().where_metadata("source", "a"))?;
        assert_eq!(removed, 1);
        collection
            .add_document(
                DocumentInput::new("d3").embedding(vec![0.0, 0.0, 1.0]),
                &CancellationToken::new(),
            )
            .await?;
    }

    let db = Database::open(root.path())?;
    let collection = db.get_collection("greetings", None).expect("exists");
    assert_eq!(collection.count(), 1);
    assert!(collection.get("d3").is_some());
    Ok(())
}

#[tokio::test]
async fn delete_collection_and_reset_remove_directories() -> Result<()> {
    let root = TempDir::new()?;
    let db = Database::open(root.path())?;
    populate(&db).await?;
    db.create_collection("other", HashMap::new(), None)?;

    db.delete_collection("greetings")?;
    db.delete_collection("never-created")?;
    assert!(!root.path().join(hash_hex("greetings")).exists());
    assert!(root.path().join(hash_hex("other")).exists());

    db.reset()?;
    assert!(db.list_collections().is_empty());
    assert!(root.path().is_dir());
    assert_eq!(fs::read_dir(root.path())?.count(), 0);

    let reopened = Database::open(root.path())?;
    assert!(reopened.list_collections().is_empty());
    Ok(())
}

#[tokio::test]
async fn open_creates_a_missing_root() -> Result<()> {
    let parent = TempDir::new()?;
    let root = parent.path().join("nested").join("db");
    let db = Database::open(&root)?;
    assert!(root.is_dir());
    assert!(db.list_collections().is_empty());
    assert_eq!(db.persist_directory(), Some(root.as_path()));
    Ok(())
}

#[tokio::test]
async fn export_and_import_through_a_file() -> Result<()> {
    let source = Database::new();
    populate(&source).await?;
    let scratch = TempDir::new()?;
    let export = scratch.path().join("backup.qvr");
    source.export_to_path(&export)?;

    let root = TempDir::new()?;
    let target = Database::open(root.path())?;
    target.create_collection("greetings", HashMap::new(), None)?;
    target.import_from_path(&export)?;

    let collection = target
        .get_collection("greetings", Some(letter_embedder()))
        .expect("imported");
    assert_eq!(collection.count(), 2);
    assert_eq!(collection.metadata()["owner"], "tests");

    let reopened = Database::open(root.path())?;
    assert_eq!(reopened.list_collections()["greetings"].count(), 2);
    Ok(())
}

#[tokio::test]
async fn export_and_import_through_streams() -> Result<()> {
    let source = Database::with_config(DatabaseConfig::builder().scoring_threads(2).build()?)?;
    populate(&source).await?;

    let mut buffer = Vec::new();
    source.export_to_writer(&mut buffer)?;

    let target = Database::new();
    target.import_from_reader(&mut Cursor::new(buffer))?;
    let collection = target
        .get_collection("greetings", Some(letter_embedder()))
        .expect("imported");
    let results = collection.query_embedding(
        &[0.1, 1.1, 1.1],
        1,
        &QueryFilter::default(),
        &CancellationToken::new(),
    )?;
    assert_eq!(results[0].id, "d2");
    Ok(())
}
