//! End-to-end exercises of the real stage implementations wired together
//! over a [`MemoryBus`], with the catalog and object store backed by
//! `wiremock` instead of a live Pharos/S3 deployment.

use std::path::Path;
use std::sync::Arc;

use archivist_bus::memory::MemoryBus;
use archivist_bus::Bus;
use archivist_catalog::Client as CatalogClient;
use archivist_diskres::DiskReservation;
use archivist_inflight::InFlightRegistry;
use archivist_objectstore::Client as ObjectStoreClient;
use archivist_pipeline::cleanup::CleanupStage;
use archivist_pipeline::fixity::FixityStage;
use archivist_pipeline::record::RecordStage;
use archivist_pipeline::result::ProcessResult;
use archivist_pipeline::stage::{Stage, StageOutcome};
use archivist_pipeline::store::StoreStage;
use archivist_pipeline::unpack::UnpackStage;
use archivist_pipeline::{fetch::FetchStage, ProcessContext};
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{BehaviorVersion, Region};
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn build_tar(dir: &Path, top: &str, entries: &[(&str, &[u8])]) -> Vec<u8> {
    let tar_path = dir.join(format!("{top}.tar"));
    {
        let file = std::fs::File::create(&tar_path).unwrap();
        let mut builder = tar::Builder::new(file);

        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Directory);
        header.set_size(0);
        header.set_mode(0o755);
        header.set_cksum();
        builder
            .append_data(&mut header, format!("{top}/"), std::io::empty())
            .unwrap();

        for (path, contents) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(contents.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, format!("{top}/{path}"), *contents)
                .unwrap();
        }
        builder.finish().unwrap();
    }
    std::fs::read(&tar_path).unwrap()
}

async fn s3_client_against(server: &MockServer) -> aws_sdk_s3::Client {
    let config = aws_sdk_s3::Config::builder()
        .behavior_version(BehaviorVersion::latest())
        .region(Region::new("us-east-1"))
        .endpoint_url(server.uri())
        .force_path_style(true)
        .credentials_provider(Credentials::new("test", "test", None, None, "test"))
        .build();
    aws_sdk_s3::Client::from_conf(config)
}

async fn context_against(server: &MockServer, working_dir: &Path) -> ProcessContext {
    let store = Arc::new(ObjectStoreClient::new(s3_client_against(server).await));
    let catalog = Arc::new(CatalogClient::new(server.uri(), "user", "key").unwrap());
    let disk = Arc::new(DiskReservation::new(working_dir, 0).unwrap());
    let inflight = Arc::new(InFlightRegistry::new());
    ProcessContext::new(
        store,
        catalog,
        disk,
        inflight,
        working_dir.to_path_buf(),
        "archivist.preservation.bucket".to_string(),
        "Archivist".to_string(),
        false,
    )
}

/// Drives `stage` against the next message on `topic`, publishing an
/// `Advance` outcome's result onward so the test can keep stepping through
/// the chain one stage at a time.
async fn step(bus: &MemoryBus, topic: &str, ctx: &ProcessContext, stage: &dyn Stage) -> StageOutcome {
    let msg = bus.consume(topic).await.unwrap().expect("expected a queued message");
    let result: ProcessResult = serde_json::from_value(msg.payload().clone()).unwrap();
    let outcome = stage.run(ctx, msg.as_ref(), result).await;
    if let StageOutcome::Advance { next_topic, result } = &outcome {
        bus.publish(next_topic, serde_json::to_value(result).unwrap()).await.unwrap();
    }
    outcome
}

#[tokio::test]
async fn good_bag_ingest_runs_fetch_through_cleanup_with_consistent_identifiers() {
    let server = MockServer::start().await;
    let fixture_dir = tempfile::tempdir().unwrap();
    let working = tempfile::tempdir().unwrap();

    let clean_bag_name = "inst.edu.sample123";
    let institution = "inst.edu";
    let object_identifier = format!("{institution}/{clean_bag_name}");
    let bucket = "aptrust.receiving.inst.edu";
    let key = format!("{clean_bag_name}.tar");

    // Built in its own directory, separate from `working` (the pipeline's
    // working volume): Fetch's in-flight check treats a pre-existing local
    // tar at the destination path as a crash-recovery signal and would
    // requeue instead of fetching if the fixture lived there too.
    let tar_bytes = build_tar(
        fixture_dir.path(),
        clean_bag_name,
        &[
            ("bagit.txt", b"BagIt-Version: 0.97\n"),
            ("aptrust-info.txt", b"Title: My Bag\nAccess: consortia\n"),
            (
                "manifest-md5.txt",
                format!("{}  data/a.txt\n", format!("{:x}", md5::compute(b"hello world"))).as_bytes(),
            ),
            ("data/a.txt", b"hello world"),
        ],
    );
    let tar_etag = format!("{:x}", md5::compute(&tar_bytes));

    Mock::given(method("GET"))
        .and(path(format!("/{bucket}/{key}")))
        .respond_with(ResponseTemplate::new(200).insert_header("etag", format!("\"{tar_etag}\"").as_str()).set_body_bytes(tar_bytes))
        .mount(&server)
        .await;

    let file_identifier = format!("{clean_bag_name}/data/a.txt");
    Mock::given(method("GET"))
        .and(path(format!("/files/{}", file_identifier.replace('/', "%2F"))))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    Mock::given(method("PUT"))
        .and(path_regex(r"^/archivist\.preservation\.bucket/[0-9a-f-]{36}$"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("/objects/{}", object_identifier.replace('/', "%2F"))))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/objects"))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "identifier": object_identifier,
            "institution": institution,
            "title": "My Bag",
            "description": "",
            "access": "consortia",
            "tags": [],
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(format!("/files/{}/events", file_identifier.replace('/', "%2F"))))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/process-status"))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "id": 1, "name": clean_bag_name, "bucket": bucket, "bag_date": "2024-01-01T00:00:00Z",
            "etag": tar_etag, "stage": "Fetch", "status": "Started", "note": "", "retry": true,
            "reviewed": false, "institution": institution, "generic_file_identifier": null,
            "object_identifier": object_identifier, "state": null,
        })))
        .mount(&server)
        .await;

    let ctx = context_against(&server, working.path()).await;
    let bus = MemoryBus::new();

    let result = ProcessResult {
        bucket: bucket.to_string(),
        key: key.clone(),
        etag: tar_etag.clone(),
        size: 11,
        institution: institution.to_string(),
        clean_bag_name: clean_bag_name.to_string(),
        object_identifier: object_identifier.clone(),
        ..Default::default()
    };
    bus.publish(archivist_pipeline::TOPIC_FETCH, serde_json::to_value(&result).unwrap())
        .await
        .unwrap();

    let fetch_outcome = step(&bus, archivist_pipeline::TOPIC_FETCH, &ctx, &FetchStage).await;
    assert!(matches!(fetch_outcome, StageOutcome::Advance { next_topic, .. } if next_topic == archivist_pipeline::TOPIC_UNPACK));

    let unpack_outcome = step(&bus, archivist_pipeline::TOPIC_UNPACK, &ctx, &UnpackStage).await;
    let StageOutcome::Advance { result: after_unpack, .. } = &unpack_outcome else {
        panic!("unpack did not advance: {:?}", debug_outcome(&unpack_outcome));
    };
    let tar_result = after_unpack.tar_result.as_ref().unwrap();
    assert_eq!(tar_result.files.len(), 1);
    assert_eq!(tar_result.files[0].friendly_identifier, file_identifier);

    let store_outcome = step(&bus, archivist_pipeline::TOPIC_STORE, &ctx, &StoreStage).await;
    let StageOutcome::Advance { result: after_store, .. } = &store_outcome else {
        panic!("store did not advance: {:?}", debug_outcome(&store_outcome));
    };
    let stored_file = &after_store.tar_result.as_ref().unwrap().files[0];
    assert!(stored_file.storage_url.as_deref().unwrap().starts_with("s3://archivist.preservation.bucket/"));
    assert_eq!(stored_file.friendly_identifier, file_identifier);

    let record_outcome = step(&bus, archivist_pipeline::TOPIC_RECORD, &ctx, &RecordStage).await;
    assert!(matches!(&record_outcome, StageOutcome::Advance { next_topic, .. } if *next_topic == archivist_pipeline::TOPIC_CLEANUP));

    let event_posts = server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.method.as_str() == "POST" && r.url.path().ends_with("/events"))
        .count();
    assert_eq!(event_posts, 5, "sha256 was present, so five events should have been recorded");

    let cleanup_outcome = step(&bus, archivist_pipeline::TOPIC_CLEANUP, &ctx, &CleanupStage { delete_on_success: false }).await;
    assert!(matches!(cleanup_outcome, StageOutcome::Done));
}

#[tokio::test]
async fn fixity_mismatch_records_a_failure_event_naming_both_digests() {
    let server = MockServer::start().await;
    let working = tempfile::tempdir().unwrap();

    let file_identifier = "inst.edu.sample123/data/a.txt";
    let preservation_key = "00000000-0000-0000-0000-0000000000aa";
    let expected_sha256 = "e".repeat(64);
    let actual_bytes = b"these are not the original bytes";

    let mut file = archivist_model::PayloadFile::new(
        "data/a.txt".to_string(),
        11,
        chrono::Utc::now(),
        "5eb63bbbe01eeed093cb22bb8f5acdc3".to_string(),
        "inst.edu.sample123",
    );
    file.storage_url = Some(format!("s3://archivist.preservation.bucket/{preservation_key}"));
    file.sha256 = Some(expected_sha256.clone());

    Mock::given(method("GET"))
        .and(path(format!("/files/{}", file_identifier.replace('/', "%2F"))))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "identifier": file_identifier,
            "object_identifier": "inst.edu/inst.edu.sample123",
            "payload": file,
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("/archivist.preservation.bucket/{preservation_key}")))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(actual_bytes.to_vec()))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(format!("/files/{}/events", file_identifier.replace('/', "%2F"))))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/process-status"))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "id": 1, "name": "x", "bucket": "x", "bag_date": "2024-01-01T00:00:00Z",
            "etag": "x", "stage": "Fixity", "status": "Failed", "note": "", "retry": false,
            "reviewed": false, "institution": "inst.edu", "generic_file_identifier": file_identifier,
            "object_identifier": null, "state": null,
        })))
        .mount(&server)
        .await;

    let ctx = context_against(&server, working.path()).await;
    let result = ProcessResult {
        generic_file_identifier: Some(file_identifier.to_string()),
        ..Default::default()
    };

    let outcome = FixityStage.run(&ctx, &NoopMessage, result).await;
    assert!(matches!(outcome, StageOutcome::Done));

    let event_request = server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .find(|r| r.method.as_str() == "POST" && r.url.path().ends_with("/events"))
        .expect("expected one event POST");
    let events_body: archivist_model::Event = serde_json::from_slice(&event_request.body).unwrap();
    assert_eq!(events_body.outcome, archivist_model::Outcome::Failure);
    assert!(events_body.outcome_detail.contains(&expected_sha256));
    assert!(events_body.outcome_detail.contains(&hex_of(actual_bytes)));
}

fn hex_of(bytes: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

fn debug_outcome(outcome: &StageOutcome) -> &'static str {
    match outcome {
        StageOutcome::Advance { .. } => "Advance",
        StageOutcome::Requeue { .. } => "Requeue",
        StageOutcome::Fail { .. } => "Fail",
        StageOutcome::Done => "Done",
    }
}

struct NoopMessage;

#[async_trait::async_trait]
impl archivist_bus::InFlightMessage for NoopMessage {
    fn id(&self) -> &str {
        "noop"
    }

    fn attempt(&self) -> u32 {
        1
    }

    fn payload(&self) -> &serde_json::Value {
        static EMPTY: serde_json::Value = serde_json::Value::Null;
        &EMPTY
    }

    async fn touch(&self) -> archivist_error::Result<()> {
        Ok(())
    }

    async fn finish(self: Box<Self>) -> archivist_error::Result<()> {
        Ok(())
    }

    async fn requeue(self: Box<Self>, _delay: std::time::Duration) -> archivist_error::Result<()> {
        Ok(())
    }
}
