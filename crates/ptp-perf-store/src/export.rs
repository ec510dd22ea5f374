//! Export of analysed runs into the gzip JSON dataset.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use ptp_perf_common::{Result, RunId};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::models::{Endpoint, LogRecord, Run, Sample};
use crate::store::RunStore;

/// One run with everything recorded for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunExport {
    #[serde(flatten)]
    pub run: Run,
    pub endpoints: Vec<EndpointExport>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointExport {
    #[serde(flatten)]
    pub endpoint: Endpoint,
    pub log_records: Vec<LogRecord>,
    pub samples: Vec<Sample>,
}

impl RunExport {
    pub fn collect(store: &RunStore, run_id: RunId) -> Result<Self> {
        let run = store.get_run(run_id)?;
        let endpoints = store
            .endpoints_of_run(run_id)?
            .into_iter()
            .map(|endpoint| {
                Ok(EndpointExport {
                    log_records: store.log_records(endpoint.id, None)?,
                    samples: store.samples(endpoint.id, None)?,
                    endpoint,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { run, endpoints })
    }

    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let decoder = GzDecoder::new(BufReader::new(File::open(path)?));
        Ok(serde_json::from_reader(decoder)?)
    }
}

/// Writes `run_id` to `path` as gzip compressed JSON.
pub fn export_run(store: &RunStore, run_id: RunId, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let export = RunExport::collect(store, run_id)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut encoder = GzEncoder::new(BufWriter::new(File::create(path)?), Compression::default());
    serde_json::to_writer(&mut encoder, &export)?;
    encoder.finish()?.flush()?;

    info!(run_id, path = %path.display(), "Exported run");
    Ok(())
}
