//! Synthetic build shared by the integration tests
//!
//! Layout of the build:
//!
//! - FileDataID 100: stored in the single CDN archive
//! - FileDataID 200: stored as a loose CDN blob
//! - FileDataID 300: has an encoding entry but no stored blob
//! - the root lives in the archive, the encoding table is loose

#![allow(dead_code, clippy::expect_used, clippy::unwrap_used)]

use std::path::Path;

use wowcasc_crypto::{ContentKey, EncodingKey, FileDataId};
use wowcasc_formats::archive::{IndexEntry, LocalRecord, build_index, build_local_index};
use wowcasc_formats::blte::{BlockMode, BlteBuilder};
use wowcasc_formats::encoding::build_encoding;
use wowcasc_formats::root::build_root;
use wowcasc_formats::{ContentFlags, EncodingEntry, LocaleFlags, RootType};

pub const ARCHIVED_ID: u32 = 100;
pub const LOOSE_ID: u32 = 200;
pub const MISSING_ID: u32 = 300;

pub const ARCHIVED_DATA: &[u8] = b"archived file contents";
pub const LOOSE_DATA: &[u8] = b"loose file contents, zlib encoded";

pub const LISTFILE: &str = "100;Interface/Archived.txt\n200;Interface/Loose.txt\n";

/// One BLTE blob and its encoding key
#[derive(Debug, Clone)]
pub struct Blob {
    pub ekey: EncodingKey,
    pub data: Vec<u8>,
}

impl Blob {
    fn encode(mode: BlockMode, content: &[u8]) -> Self {
        let data = BlteBuilder::single(mode, content).expect("Test operation should succeed");
        Self {
            ekey: EncodingKey::from_data(&data),
            data,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BuildFixture {
    pub build_key: String,
    pub cdn_key: String,
    pub build_config: String,
    pub cdn_config: String,
    pub archive_key: String,
    pub archive: Vec<u8>,
    pub archive_index: Vec<u8>,
    pub encoding: Blob,
    pub root: Blob,
    pub archived: Blob,
    pub loose: Blob,
    pub missing_ekey: EncodingKey,
}

impl BuildFixture {
    pub fn new() -> Self {
        let archived = Blob::encode(BlockMode::None, ARCHIVED_DATA);
        let loose = Blob::encode(BlockMode::ZLib, LOOSE_DATA);
        let missing_ekey = EncodingKey::from_bytes([0x5A; 16]);

        let archived_ckey = ContentKey::from_data(ARCHIVED_DATA);
        let loose_ckey = ContentKey::from_data(LOOSE_DATA);
        let missing_ckey = ContentKey::from_bytes([0xA5; 16]);

        let root_content = build_root(&[(
            RootType {
                locale: LocaleFlags(LocaleFlags::EN_US | LocaleFlags::EN_GB),
                content: ContentFlags(ContentFlags::NO_NAME_HASH),
            },
            vec![
                (FileDataId::new(ARCHIVED_ID), archived_ckey),
                (FileDataId::new(LOOSE_ID), loose_ckey),
                (FileDataId::new(MISSING_ID), missing_ckey),
            ],
        )]);
        let root_ckey = ContentKey::from_data(&root_content);
        let root = Blob::encode(BlockMode::ZLib, &root_content);

        let encoding_content = build_encoding(&[
            (root_ckey, entry(root.ekey, root_content.len())),
            (archived_ckey, entry(archived.ekey, ARCHIVED_DATA.len())),
            (loose_ckey, entry(loose.ekey, LOOSE_DATA.len())),
            (missing_ckey, entry(missing_ekey, 12)),
        ])
        .expect("Test operation should succeed");
        let encoding_ckey = ContentKey::from_data(&encoding_content);
        let encoding = Blob::encode(BlockMode::ZLib, &encoding_content);

        let mut archive = root.data.clone();
        archive.extend_from_slice(&archived.data);
        let archive_index = build_index(&[
            IndexEntry {
                ekey: root.ekey,
                size: root.data.len() as u64,
                offset: 0,
            },
            IndexEntry {
                ekey: archived.ekey,
                size: archived.data.len() as u64,
                offset: root.data.len() as u64,
            },
        ]);
        let archive_key = ContentKey::from_data(&archive).to_hex();

        let build_config = format!(
            "# Build Configuration\n\nroot = {root_ckey}\nencoding = {encoding_ckey} {}\nencoding-size = {} {}\nbuild-name = WOW-99999patch11.0.7_Retail\n",
            encoding.ekey,
            encoding_content.len(),
            encoding.data.len(),
        );
        let cdn_config = format!("# CDN Configuration\n\narchives = {archive_key}\n");

        Self {
            build_key: ContentKey::from_data(build_config.as_bytes()).to_hex(),
            cdn_key: ContentKey::from_data(cdn_config.as_bytes()).to_hex(),
            build_config,
            cdn_config,
            archive_key,
            archive,
            archive_index,
            encoding,
            root,
            archived,
            loose,
            missing_ekey,
        }
    }

    /// `versions` table listing this build for `us`, plus `extra` build keys
    pub fn versions(&self, extra: &[&str]) -> String {
        let mut text = String::from(
            "Region!STRING:0|BuildConfig!HEX:16|CDNConfig!HEX:16|KeyRing!HEX:16|BuildId!DEC:4|VersionsName!String:0|ProductConfig!HEX:16\n## seqn = 2241282\n",
        );
        text.push_str(&format!(
            "us|{}|{}||99999|11.0.7.99999|\n",
            self.build_key, self.cdn_key
        ));
        for key in extra {
            text.push_str(&format!("us|{key}|{}||99998|11.0.7.99998|\n", self.cdn_key));
        }
        text.push_str(&format!(
            "eu|{}|{}||99999|11.0.7.99999|\n",
            self.build_key, self.cdn_key
        ));
        text
    }

    /// Write a local installation holding every stored blob of the build
    pub fn write_install(&self, install: &Path) {
        let config_dir = install
            .join("Data")
            .join("config")
            .join(&self.build_key[0..2])
            .join(&self.build_key[2..4]);
        std::fs::create_dir_all(&config_dir).expect("Test operation should succeed");
        std::fs::write(config_dir.join(&self.build_key), &self.build_config)
            .expect("Test operation should succeed");

        let data_dir = install.join("Data").join("data");
        std::fs::create_dir_all(&data_dir).expect("Test operation should succeed");

        let mut data = Vec::new();
        let mut records = Vec::new();
        for blob in [&self.encoding, &self.root, &self.archived, &self.loose] {
            let offset = data.len() as u32;
            data.extend_from_slice(&[0u8; 30]);
            data.extend_from_slice(&blob.data);
            records.push(LocalRecord::new(
                blob.ekey.local_prefix(),
                0,
                offset,
                blob.data.len() as u32 + 30,
            ));
        }
        std::fs::write(data_dir.join("data.000"), &data).expect("Test operation should succeed");
        std::fs::write(data_dir.join("0000000002.idx"), build_local_index(&records).expect("Test operation should succeed"))
            .expect("Test operation should succeed");

        // Superseded version pointing every key at garbage
        let stale: Vec<LocalRecord> = records
            .iter()
            .map(|r| LocalRecord::new(r.key, 7, 0, 64))
            .collect();
        std::fs::write(data_dir.join("0000000001.idx"), build_local_index(&stale).expect("Test operation should succeed"))
            .expect("Test operation should succeed");

        // Unreadable bucket, skipped with a warning
        std::fs::write(data_dir.join("0100000001.idx"), [0x10, 0, 0, 0])
            .expect("Test operation should succeed");

        let columns = [
            "Branch!STRING:0",
            "Active!DEC:1",
            "Build Key!HEX:16",
            "CDN Key!HEX:16",
            "Install Key!HEX:16",
            "IM Size!DEC:4",
            "CDN Path!STRING:0",
            "CDN Hosts!STRING:0",
            "Tags!STRING:0",
            "Version!STRING:0",
            "Product!STRING:0",
        ];
        let values: [&str; 11] = [
            "us",
            "1",
            &self.build_key,
            &self.cdn_key,
            "",
            "",
            "tpr/wow",
            "level3.blizzard.com",
            "Windows x86_64 US? enUS speech?:Windows x86_64 US? enUS text?",
            "11.0.7.99999",
            "wow",
        ];
        std::fs::write(
            install.join(".build.info"),
            format!("{}\n{}\n", columns.join("|"), values.join("|")),
        )
        .expect("Test operation should succeed");
    }
}

fn entry(ekey: EncodingKey, size: usize) -> EncodingEntry {
    EncodingEntry {
        ekey,
        size: size as u64,
    }
}

/// Send test logs through the test writer; repeated calls are harmless
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("wowcasc_client=debug")
        .with_test_writer()
        .try_init();
}
