use std::{fs, io::Cursor, path::Path, sync::Arc};

use mockito::{Matcher, Server, ServerGuard};
use tempfile::tempdir;
use url::Url;
use wvault::{
    BatchConfig, BatchUploadState, FileUploadStatus, LocalFileRef, UploadOptions, UploadSession,
    VaultClient, local_file::materialize, run_batch, state::StateRecorder,
};

fn file_response(token: &str, name: &str) -> String {
    format!(
        r#"{{
            "token": "{token}",
            "url": "https://waifuvault.moe/f/1700000000/{name}",
            "options": {{"hideFilename": false, "oneTimeDownload": false, "protected": false}},
            "retentionPeriod": 3600000
        }}"#
    )
}

async fn mock_upload(server: &mut ServerGuard, name: &str, token: &str) -> mockito::Mock {
    server
        .mock("PUT", "/rest")
        .match_body(Matcher::Regex(format!(r#"filename="{}""#, name)))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(file_response(token, name))
        .create_async()
        .await
}

fn write_file(dir: &Path, name: &str, content: &str) -> LocalFileRef {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    LocalFileRef::from_path(&path).unwrap()
}

fn client_for(server: &ServerGuard) -> VaultClient {
    VaultClient::new(Url::parse(&server.url()).unwrap()).unwrap()
}

#[tokio::test]
async fn test_batch_with_one_rejected_file_keeps_the_rest() {
    let mut server = Server::new_async().await;
    let first = mock_upload(&mut server, "one.txt", "tok-1").await;
    let third = mock_upload(&mut server, "three.txt", "tok-3").await;
    let rejected = server
        .mock("PUT", "/rest")
        .match_body(Matcher::Regex(r#"filename="two.exe""#.to_string()))
        .with_status(400)
        .with_header("content-type", "application/json")
        .with_body(r#"{"name": "BAD_REQUEST", "message": "File type is banned", "status": 400}"#)
        .create_async()
        .await;

    let dir = tempdir().unwrap();
    let files = vec![
        write_file(dir.path(), "one.txt", "1"),
        write_file(dir.path(), "two.exe", "2"),
        write_file(dir.path(), "three.txt", "3"),
    ];

    let recorder = StateRecorder::new();
    run_batch(
        &client_for(&server),
        &files,
        &UploadOptions::default(),
        &BatchConfig::default(),
        &recorder,
    )
    .await;

    first.assert_async().await;
    rejected.assert_async().await;
    third.assert_async().await;

    let states = recorder.states();
    let (last, progress) = states.split_last().unwrap();

    for state in progress {
        let BatchUploadState::UploadingMultiple(entries) = state else {
            panic!("unexpected intermediate state {:?}", state);
        };
        let names: Vec<_> = entries.iter().map(|e| e.file_name.as_str()).collect();
        assert_eq!(names, ["one.txt", "two.exe", "three.txt"]);
    }

    let BatchUploadState::UploadingMultiple(final_progress) = &progress[progress.len() - 1] else {
        panic!("expected a progress snapshot before the result");
    };
    assert_eq!(
        final_progress[1].status,
        FileUploadStatus::Error("File type is banned".to_string())
    );

    match last {
        BatchUploadState::Success { file, all_files } => {
            assert_eq!(file.token, "tok-1");
            let tokens: Vec<_> = all_files.iter().map(|f| f.token.as_str()).collect();
            assert_eq!(tokens, ["tok-1", "tok-3"]);
        }
        other => panic!("expected success, got {:?}", other),
    }
}

#[tokio::test]
async fn test_session_uploads_stdin_copy_into_bucket() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("PUT", "/rest")
        .match_body(Matcher::AllOf(vec![
            Matcher::Regex(r#"filename="notes.md""#.to_string()),
            Matcher::Regex("piped content".to_string()),
            Matcher::Regex(r#"name="bucket_token"\r\n\r\nbucket-abc"#.to_string()),
            Matcher::Regex(r#"name="expires"\r\n\r\n1d"#.to_string()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(file_response("tok-md", "notes.md"))
        .create_async()
        .await;

    let copy = materialize(&mut Cursor::new("piped content"), "notes.md").unwrap();

    let session = UploadSession::new(Arc::new(client_for(&server)), BatchConfig::default());
    session.update_options(UploadOptions {
        expiry: Some("1d".to_string()),
        bucket_token: Some("bucket-abc".to_string()),
        ..Default::default()
    });

    let mut receiver = session.subscribe();
    let handle = session.submit(vec![copy.file().clone()]).unwrap();
    let terminal = receiver
        .wait_for(BatchUploadState::is_terminal)
        .await
        .unwrap()
        .clone();
    handle.await.unwrap();
    mock.assert_async().await;

    match terminal {
        BatchUploadState::Success { file, all_files } => {
            assert_eq!(file.token, "tok-md");
            assert_eq!(file.retention_period.to_string(), "1h");
            assert_eq!(all_files.len(), 1);
        }
        other => panic!("expected success, got {:?}", other),
    }

    session.reset();
    assert_eq!(session.current(), BatchUploadState::Idle);
}

#[tokio::test]
async fn test_failed_single_upload_reports_server_message() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("PUT", "/rest")
        .with_status(413)
        .with_body("too big")
        .create_async()
        .await;

    let dir = tempdir().unwrap();
    let files = vec![write_file(dir.path(), "huge.bin", "x")];

    let recorder = StateRecorder::new();
    run_batch(
        &client_for(&server),
        &files,
        &UploadOptions::default(),
        &BatchConfig::default(),
        &recorder,
    )
    .await;
    mock.assert_async().await;

    let states = recorder.states();
    assert_eq!(states[0], BatchUploadState::UploadingSingle(0));
    assert_eq!(states[1], BatchUploadState::UploadingSingle(100));
    match &states[2] {
        BatchUploadState::Error { message, .. } => {
            assert_eq!(message, "huge.bin: Upload failed: Payload Too Large");
        }
        other => panic!("expected error, got {:?}", other),
    }
}
