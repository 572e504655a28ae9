//! Remote client against a mocked patch service and CDN
#![allow(clippy::expect_used, clippy::unwrap_used)]

mod common;

use std::path::Path;

use common::{ARCHIVED_DATA, ARCHIVED_ID, BuildFixture, LISTFILE, LOOSE_DATA, LOOSE_ID, MISSING_ID};
use pretty_assertions::assert_eq;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};
use wowcasc_client::{
    CascError, CascSource, ClientConfig, FileOptions, LoadState, LookupReason, MemoryListfile,
    RemoteCasc,
};
use wowcasc_crypto::FileDataId;
use wowcasc_formats::LocaleFlags;

fn cdn_path(kind: &str, key: &str, suffix: &str) -> String {
    format!("/tpr/wow/{kind}/{}/{}/{key}{suffix}", &key[0..2], &key[2..4])
}

fn get(at: &str, body: impl Into<Vec<u8>>) -> Mock {
    Mock::given(method("GET"))
        .and(path(at))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.into()))
}

fn ranged(at: &str, archive: &[u8], offset: usize, len: usize) -> Mock {
    Mock::given(method("GET"))
        .and(path(at))
        .and(header("range", format!("bytes={offset}-{}", offset + len - 1).as_str()))
        .respond_with(ResponseTemplate::new(206).set_body_bytes(archive[offset..offset + len].to_vec()))
}

fn index_mock(fixture: &BuildFixture) -> Mock {
    get(
        &cdn_path("data", &fixture.archive_key, ".index"),
        fixture.archive_index.clone(),
    )
}

/// Patch service tables only
async fn mount_discovery(server: &MockServer, fixture: &BuildFixture, extra_builds: &[&str]) {
    get("/wow/versions", fixture.versions(extra_builds)).mount(server).await;

    let cdns = format!(
        "Name!STRING:0|Path!STRING:0|Hosts!STRING:0|Servers!STRING:0|ConfigPath!STRING:0\n## seqn = 7\neu|tpr/wow|eu.cdn.invalid|http://eu.cdn.invalid/|tpr/configs/data\nus|tpr/wow|{}|http://{}/?maxhosts=4|tpr/configs/data\n",
        server.address(),
        server.address(),
    );
    get("/wow/cdns", cdns).mount(server).await;
}

/// Everything but the archive index
async fn mount_build(server: &MockServer, fixture: &BuildFixture, extra_builds: &[&str]) {
    mount_discovery(server, fixture, extra_builds).await;

    get(&cdn_path("config", &fixture.build_key, ""), fixture.build_config.clone())
        .mount(server)
        .await;
    get(&cdn_path("config", &fixture.cdn_key, ""), fixture.cdn_config.clone())
        .mount(server)
        .await;

    let archive_path = cdn_path("data", &fixture.archive_key, "");
    ranged(&archive_path, &fixture.archive, 0, fixture.root.data.len())
        .mount(server)
        .await;
    ranged(
        &archive_path,
        &fixture.archive,
        fixture.root.data.len(),
        fixture.archived.data.len(),
    )
    .mount(server)
    .await;

    for blob in [&fixture.encoding, &fixture.loose] {
        get(&cdn_path("data", &blob.ekey.to_hex(), ""), blob.data.clone())
            .mount(server)
            .await;
    }
}

fn client(server: &MockServer, cache_dir: &Path) -> RemoteCasc {
    let config = ClientConfig {
        patch_host: Some(server.uri()),
        cache_dir: cache_dir.to_path_buf(),
        ..ClientConfig::default()
    };
    RemoteCasc::new(config)
        .expect("Test operation should succeed")
        .with_products(["wow"])
        .with_listfile(Box::new(MemoryListfile::from_text(LISTFILE)))
}

async fn loaded_client(server: &MockServer, fixture: &BuildFixture, cache_dir: &Path) -> RemoteCasc {
    mount_build(server, fixture, &[]).await;
    index_mock(fixture).mount(server).await;

    let mut client = client(server, cache_dir);
    client.init().await.expect("Test operation should succeed");
    client.load(0).await.expect("Test operation should succeed");
    client
}

#[tokio::test]
async fn test_load_and_fetch_files() {
    common::init_tracing();
    let fixture = BuildFixture::new();
    let server = MockServer::start().await;
    let cache = tempfile::tempdir().expect("Test operation should succeed");

    mount_build(&server, &fixture, &[]).await;
    index_mock(&fixture).mount(&server).await;

    let mut client = client(&server, cache.path());
    let builds = client.init().await.expect("Test operation should succeed");
    assert_eq!(builds.len(), 1);
    assert_eq!(builds[0].version_name, "11.0.7.99999");
    assert_eq!(builds[0].region, "us");
    assert_eq!(builds[0].product_config, None);

    assert_eq!(client.state(), LoadState::Unloaded);
    client.load(0).await.expect("Test operation should succeed");
    assert_eq!(client.state(), LoadState::Ready);

    let data = client
        .get_file(FileDataId::new(ARCHIVED_ID), FileOptions::default())
        .await
        .expect("Test operation should succeed");
    assert_eq!(data, ARCHIVED_DATA);

    let data = client
        .get_file(FileDataId::new(LOOSE_ID), FileOptions::default())
        .await
        .expect("Test operation should succeed");
    assert_eq!(data, LOOSE_DATA);

    let data = client
        .get_file_by_name("INTERFACE\\Archived.txt", FileOptions::default())
        .await
        .expect("Test operation should succeed");
    assert_eq!(data, ARCHIVED_DATA);

    let info = client
        .file_encoding_info(FileDataId::new(LOOSE_ID))
        .expect("Test operation should succeed");
    assert_eq!(info.ekey, fixture.loose.ekey);
    assert_eq!(info.size, LOOSE_DATA.len() as u64);

    assert_eq!(
        client.get_valid_root_entries().expect("Test operation should succeed"),
        vec![
            FileDataId::new(ARCHIVED_ID),
            FileDataId::new(LOOSE_ID),
            FileDataId::new(MISSING_ID)
        ]
    );

    let cache_handle = client.cache();
    assert!(cache_handle.index_path(&fixture.archive_key).exists());
    assert!(
        cache_handle
            .build_path(&fixture.build_key, &fixture.encoding.ekey.to_hex())
            .exists()
    );
    assert!(cache_handle.data_path(&fixture.loose.ekey.to_hex()).exists());
}

#[tokio::test]
async fn test_lookup_failures() {
    let fixture = BuildFixture::new();
    let server = MockServer::start().await;
    let cache = tempfile::tempdir().expect("Test operation should succeed");
    let mut client = loaded_client(&server, &fixture, cache.path()).await;

    let reason = |result: wowcasc_client::Result<Vec<u8>>| result.unwrap_err().lookup_reason();

    assert_eq!(
        reason(client.get_file(FileDataId::new(999), FileOptions::default()).await),
        Some(LookupReason::NoRootEntry)
    );
    assert_eq!(
        reason(client.get_file(FileDataId::new(MISSING_ID), FileOptions::default()).await),
        Some(LookupReason::NoArchiveEntry)
    );
    assert_eq!(
        reason(client.get_file_by_name("interface/unknown.txt", FileOptions::default()).await),
        Some(LookupReason::NoListfileEntry)
    );

    client.set_locale(LocaleFlags(LocaleFlags::DE_DE));
    assert_eq!(
        reason(client.get_file(FileDataId::new(ARCHIVED_ID), FileOptions::default()).await),
        Some(LookupReason::NoEntryForLocale)
    );
    assert!(client.get_valid_root_entries().expect("Test operation should succeed").is_empty());
}

#[tokio::test]
async fn test_discovery_skips_failing_product() {
    let fixture = BuildFixture::new();
    let server = MockServer::start().await;
    let cache = tempfile::tempdir().expect("Test operation should succeed");
    mount_discovery(&server, &fixture, &[]).await;
    // wowt/versions is not mounted and answers 404

    let mut client = client(&server, cache.path()).with_products(["wowt", "wow"]);
    let builds = client.init().await.expect("Test operation should succeed");
    assert_eq!(builds.len(), 1);
    assert_eq!(builds[0].product, "wow");
    assert_eq!(builds[0].build_config, fixture.build_key);
}

#[tokio::test]
async fn test_missing_config_fails_load() {
    let fixture = BuildFixture::new();
    let server = MockServer::start().await;
    let cache = tempfile::tempdir().expect("Test operation should succeed");
    mount_discovery(&server, &fixture, &[]).await;

    let mut client = client(&server, cache.path());
    client.init().await.expect("Test operation should succeed");
    let err = client.load(0).await.unwrap_err();
    assert!(matches!(err, CascError::ConfigFetch { status: 404, .. }), "{err}");
    assert_eq!(client.state(), LoadState::Unloaded);
    assert!(matches!(
        client.get_file(FileDataId::new(ARCHIVED_ID), FileOptions::default()).await,
        Err(CascError::NotReady { .. })
    ));
}

#[tokio::test]
async fn test_failed_reload_keeps_previous_build() {
    let fixture = BuildFixture::new();
    let server = MockServer::start().await;
    let cache = tempfile::tempdir().expect("Test operation should succeed");

    let unknown_build = "ffffffffffffffffffffffffffffffff";
    mount_build(&server, &fixture, &[unknown_build]).await;
    index_mock(&fixture).mount(&server).await;

    let mut client = client(&server, cache.path());
    let builds = client.init().await.expect("Test operation should succeed");
    assert_eq!(builds.len(), 2);
    assert_eq!(builds[1].build_config, unknown_build);

    client.load(0).await.expect("Test operation should succeed");
    assert!(client.load(1).await.is_err());
    assert_eq!(client.state(), LoadState::Ready);

    let data = client
        .get_file(FileDataId::new(ARCHIVED_ID), FileOptions::default())
        .await
        .expect("Test operation should succeed");
    assert_eq!(data, ARCHIVED_DATA);
}

#[tokio::test]
async fn test_failed_listfile_reload_keeps_names() {
    let fixture = BuildFixture::new();
    let server = MockServer::start().await;
    let cache = tempfile::tempdir().expect("Test operation should succeed");
    mount_build(&server, &fixture, &[]).await;
    index_mock(&fixture).mount(&server).await;

    let mut client = client(&server, cache.path()).with_listfile(Box::new(MemoryListfile::new()));
    let listfile = MemoryListfile::cache_path(client.cache());
    std::fs::write(&listfile, LISTFILE).expect("Test operation should succeed");
    client.init().await.expect("Test operation should succeed");
    client.load(0).await.expect("Test operation should succeed");

    std::fs::write(&listfile, "9999;unrelated.txt\n").expect("Test operation should succeed");
    let err = client.load(0).await.unwrap_err();
    assert!(matches!(err, CascError::EmptyListfile), "{err}");
    assert_eq!(client.state(), LoadState::Ready);

    let data = client
        .get_file_by_name("Interface/Archived.txt", FileOptions::default())
        .await
        .expect("Test operation should succeed");
    assert_eq!(data, ARCHIVED_DATA);
}

#[tokio::test]
async fn test_archive_index_fetched_once() {
    let fixture = BuildFixture::new();
    let server = MockServer::start().await;
    let cache = tempfile::tempdir().expect("Test operation should succeed");

    mount_build(&server, &fixture, &[]).await;
    index_mock(&fixture).expect(1).mount(&server).await;

    let mut client = client(&server, cache.path());
    client.init().await.expect("Test operation should succeed");
    client.load(0).await.expect("Test operation should succeed");

    let index = client
        .get_archive_index(&fixture.archive_key)
        .await
        .expect("Test operation should succeed");
    assert_eq!(index.len(), 2);

    // A second client over the same cache never hits the CDN for the index
    let mut second = self::client(&server, cache.path());
    second.init().await.expect("Test operation should succeed");
    second.load(0).await.expect("Test operation should succeed");
}

#[tokio::test]
async fn test_corrupt_cached_index_is_refetched() {
    let fixture = BuildFixture::new();
    let server = MockServer::start().await;
    let cache = tempfile::tempdir().expect("Test operation should succeed");

    mount_build(&server, &fixture, &[]).await;
    index_mock(&fixture).expect(1).mount(&server).await;

    let mut client = client(&server, cache.path());
    let cached = client.cache().index_path(&fixture.archive_key);
    std::fs::create_dir_all(cached.parent().expect("Test operation should succeed"))
        .expect("Test operation should succeed");
    std::fs::write(&cached, b"not an index").expect("Test operation should succeed");

    client.init().await.expect("Test operation should succeed");
    client.load(0).await.expect("Test operation should succeed");
    assert_eq!(
        std::fs::read(&cached).expect("Test operation should succeed"),
        fixture.archive_index
    );
}

#[tokio::test]
async fn test_corrupt_cached_blobs_are_refetched() {
    let fixture = BuildFixture::new();
    let server = MockServer::start().await;
    let cache = tempfile::tempdir().expect("Test operation should succeed");
    mount_build(&server, &fixture, &[]).await;
    index_mock(&fixture).mount(&server).await;

    let mut client = client(&server, cache.path());
    let encoding = client
        .cache()
        .build_path(&fixture.build_key, &fixture.encoding.ekey.to_hex());
    let loose = client.cache().data_path(&fixture.loose.ekey.to_hex());
    for cached in [&encoding, &loose] {
        std::fs::create_dir_all(cached.parent().expect("Test operation should succeed"))
            .expect("Test operation should succeed");
        std::fs::write(cached, b"<html>gateway error</html>").expect("Test operation should succeed");
    }

    client.init().await.expect("Test operation should succeed");
    client.load(0).await.expect("Test operation should succeed");
    assert_eq!(
        std::fs::read(&encoding).expect("Test operation should succeed"),
        fixture.encoding.data
    );

    let data = client
        .get_file(FileDataId::new(LOOSE_ID), FileOptions::default())
        .await
        .expect("Test operation should succeed");
    assert_eq!(data, LOOSE_DATA);
    assert_eq!(
        std::fs::read(&loose).expect("Test operation should succeed"),
        fixture.loose.data
    );
}

#[tokio::test]
async fn test_data_file_range() {
    let fixture = BuildFixture::new();
    let server = MockServer::start().await;
    let cache = tempfile::tempdir().expect("Test operation should succeed");
    let client = loaded_client(&server, &fixture, cache.path()).await;

    let archive_path = format!(
        "{}/{}/{}",
        &fixture.archive_key[0..2],
        &fixture.archive_key[2..4],
        fixture.archive_key
    );
    let bytes = client
        .get_data_file_range(&archive_path, fixture.root.data.len() as u64, fixture.archived.data.len() as u64)
        .await
        .expect("Test operation should succeed");
    assert_eq!(bytes.as_ref(), fixture.archived.data.as_slice());
}
