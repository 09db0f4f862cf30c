// Shared test helpers: a text-format fake database and scripted fetchers.
//
// Fake database files hold one directive per line:
//   epoch <n>                  build epoch reported in metadata
//   <ip> <code> <geoname_id>   an exact-address record
//   fail <ip>                  lookups of <ip> report a reader error
// Anything else makes the file fail to open.

#![allow(dead_code)] // Each test binary uses a different subset

use std::collections::HashMap;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use geoip_region::geoip::{
    DatabaseFetcher, DatabaseHandle, DatabaseReader, FetchRequest, HandleMetadata, InstancePool,
    Record, SharedState,
};
use geoip_region::handler::ProvisionContext;
use geoip_region::GeoIpError;

/// Address with a known record in [`NZ_DATABASE`].
pub const NZ_ADDRESS: &str = "202.36.75.151";

pub const NZ_DATABASE: &str = "epoch 1700000000\n202.36.75.151 NZ 2186224\n";
pub const AU_DATABASE: &str = "epoch 1800000000\n202.36.75.151 AU 2077456\n";

/// Opens and closes observed across all handles of one reader.
#[derive(Debug, Clone, Default)]
pub struct Counters {
    pub opens: Arc<AtomicUsize>,
    pub closes: Arc<AtomicUsize>,
}

impl Counters {
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Default)]
pub struct FakeReader {
    pub counters: Counters,
}

impl FakeReader {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

enum Entry {
    Found(Record),
    Fail,
}

struct FakeHandle {
    entries: HashMap<IpAddr, Entry>,
    epoch: u64,
    closes: Arc<AtomicUsize>,
}

impl DatabaseReader for FakeReader {
    fn open(&self, path: &Path) -> Result<Arc<dyn DatabaseHandle>, GeoIpError> {
        let corrupt = |reason: String| GeoIpError::DatabaseOpenFailed {
            path: path.to_path_buf(),
            source: anyhow::anyhow!(reason),
        };

        let text = std::fs::read_to_string(path).map_err(|e| corrupt(e.to_string()))?;
        let mut entries = HashMap::new();
        let mut epoch = 0;

        for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
            let fields: Vec<&str> = line.split_whitespace().collect();
            match fields.as_slice() {
                ["epoch", n] => epoch = n.parse::<u64>().map_err(|_| corrupt(line.to_string()))?,
                ["fail", ip] => {
                    let ip = ip.parse::<IpAddr>().map_err(|_| corrupt(line.to_string()))?;
                    entries.insert(ip, Entry::Fail);
                }
                [ip, code, id] => {
                    let ip = ip.parse::<IpAddr>().map_err(|_| corrupt(line.to_string()))?;
                    let geoname_id = id.parse::<u32>().map_err(|_| corrupt(line.to_string()))?;
                    entries.insert(
                        ip,
                        Entry::Found(Record {
                            country_code: code.to_string(),
                            geoname_id,
                        }),
                    );
                }
                _ => return Err(corrupt(format!("unexpected line {line:?}"))),
            }
        }

        self.counters.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(FakeHandle {
            entries,
            epoch,
            closes: Arc::clone(&self.counters.closes),
        }))
    }
}

impl DatabaseHandle for FakeHandle {
    fn lookup(&self, address: IpAddr) -> Result<Option<Record>, GeoIpError> {
        match self.entries.get(&address) {
            Some(Entry::Found(record)) => Ok(Some(record.clone())),
            Some(Entry::Fail) => Err(GeoIpError::LookupFailed {
                address,
                source: anyhow::anyhow!("corrupt search tree"),
            }),
            None => Ok(None),
        }
    }

    fn metadata(&self) -> HandleMetadata {
        HandleMetadata {
            database_type: "Fake-Country".to_string(),
            build_epoch: self.epoch,
            binary_format_major_version: 2,
            binary_format_minor_version: 0,
        }
    }
}

impl Drop for FakeHandle {
    fn drop(&mut self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Fetcher that writes fixed content, or fails when it has none.
#[derive(Debug, Default)]
pub struct ScriptedFetcher {
    content: Mutex<Option<String>>,
    calls: AtomicUsize,
    requests: Mutex<Vec<FetchRequest>>,
}

impl ScriptedFetcher {
    /// Every fetch fails.
    pub fn failing() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every fetch writes `content` to the destination.
    pub fn serving(content: &str) -> Arc<Self> {
        let fetcher = Self::default();
        *fetcher.content.lock().unwrap() = Some(content.to_string());
        Arc::new(fetcher)
    }

    pub fn serve(&self, content: Option<&str>) {
        *self.content.lock().unwrap() = content.map(str::to_string);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<FetchRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl DatabaseFetcher for ScriptedFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<(), GeoIpError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());

        let content = self.content.lock().unwrap().clone();
        match content {
            Some(content) => {
                std::fs::write(&request.destination, content).unwrap();
                Ok(())
            }
            None => Err(GeoIpError::FetchFailed {
                edition: request.edition.clone(),
                source: anyhow::anyhow!("401 Unauthorized"),
            }),
        }
    }
}

/// Writes a fake database file and returns its path.
pub fn write_database(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).expect("Failed to write test database");
    path
}

/// Provision context over fakes, with an empty environment.
pub fn test_context(
    reader: Arc<FakeReader>,
    fetcher: Arc<ScriptedFetcher>,
) -> ProvisionContext {
    ProvisionContext::new(Arc::new(InstancePool::<SharedState>::new()), reader, fetcher)
        .with_env(|_| None)
}

pub fn ip(text: &str) -> IpAddr {
    text.parse().expect("valid test address")
}

// A two-node IPv4 MaxMind database built byte by byte:
//   1.../1    country NZ (2186224)
//   01.../2   registered_country US (6252001) only
//   00.../2   no data
pub const MAXMIND_EPOCH: u64 = 1700000000;

pub fn maxmind_fixture() -> Vec<u8> {
    let nz = mmdb_map(&[(
        "country",
        mmdb_map(&[
            ("geoname_id", mmdb_uint(6, 2186224)),
            ("iso_code", mmdb_string("NZ")),
        ]),
    )]);
    let registered_only = mmdb_map(&[(
        "registered_country",
        mmdb_map(&[
            ("geoname_id", mmdb_uint(6, 6252001)),
            ("iso_code", mmdb_string("US")),
        ]),
    )]);

    let node_count: u32 = 2;
    let data = |offset: usize| node_count + 16 + offset as u32;
    let records = [1, data(0), node_count, data(nz.len())];

    let mut db = Vec::new();
    for record in records {
        // 24-bit records
        db.extend_from_slice(&record.to_be_bytes()[1..]);
    }
    db.extend_from_slice(&[0u8; 16]);
    db.extend(nz);
    db.extend(registered_only);
    db.extend_from_slice(b"\xab\xcd\xefMaxMind.com");
    db.extend(mmdb_map(&[
        ("binary_format_major_version", mmdb_uint(5, 2)),
        ("binary_format_minor_version", mmdb_uint(5, 0)),
        ("build_epoch", mmdb_uint(9, MAXMIND_EPOCH)),
        ("database_type", mmdb_string("GeoLite2-Country")),
        ("description", mmdb_map(&[("en", mmdb_string("Test fixture"))])),
        ("ip_version", mmdb_uint(5, 4)),
        ("languages", mmdb_array(&[mmdb_string("en")])),
        ("node_count", mmdb_uint(6, node_count as u64)),
        ("record_size", mmdb_uint(5, 24)),
    ]));
    db
}

fn mmdb_control(kind: u8, size: usize) -> Vec<u8> {
    assert!(size < 29, "fixture fields stay short");
    if kind <= 7 {
        vec![(kind << 5) | size as u8]
    } else {
        vec![size as u8, kind - 7]
    }
}

fn mmdb_string(value: &str) -> Vec<u8> {
    let mut out = mmdb_control(2, value.len());
    out.extend_from_slice(value.as_bytes());
    out
}

/// `kind` is 5 (uint16), 6 (uint32) or 9 (uint64).
fn mmdb_uint(kind: u8, value: u64) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let skip = bytes.iter().take_while(|b| **b == 0).count();
    let mut out = mmdb_control(kind, bytes.len() - skip);
    out.extend_from_slice(&bytes[skip..]);
    out
}

fn mmdb_map(entries: &[(&str, Vec<u8>)]) -> Vec<u8> {
    let mut out = mmdb_control(7, entries.len());
    for (key, value) in entries {
        out.extend(mmdb_string(key));
        out.extend_from_slice(value);
    }
    out
}

fn mmdb_array(items: &[Vec<u8>]) -> Vec<u8> {
    let mut out = mmdb_control(11, items.len());
    for item in items {
        out.extend_from_slice(item);
    }
    out
}
