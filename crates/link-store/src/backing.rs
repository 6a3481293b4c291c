//! Flat CSV backing file: one `principal_id,external_name` record per line,
//! no header, `\n` terminated.

use guard_core::{IdentityLink, PrincipalId};
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Parses every well-formed record from `reader`. Records that do not have
/// exactly two fields, or whose first field is not an integer, are skipped.
pub fn read_links<R: Read>(reader: R) -> Vec<IdentityLink> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);

    let mut links = Vec::new();
    for (index, record) in csv_reader.records().enumerate() {
        let record = match record {
            Ok(record) => record,
            Err(err) => {
                warn!(line = index + 1, error = %err, "skipping unreadable link record");
                continue;
            }
        };
        if record.len() != 2 {
            warn!(line = index + 1, fields = record.len(), "skipping malformed link record");
            continue;
        }
        match record[0].parse::<PrincipalId>() {
            Ok(principal_id) => links.push(IdentityLink::new(principal_id, &record[1])),
            Err(_) => {
                warn!(line = index + 1, "skipping link record with non-numeric principal id");
            }
        }
    }
    links
}

/// Reads the backing file at `path`. A missing file is an empty mapping.
pub fn load_file(path: &Path) -> io::Result<Vec<IdentityLink>> {
    match File::open(path) {
        Ok(file) => Ok(read_links(file)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(err) => Err(err),
    }
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Rewrites the whole backing file with `links`. The records land in a
/// staging file first and are renamed over `path`, so a failed write never
/// leaves a truncated mapping behind.
pub fn write_file(path: &Path, links: &[IdentityLink]) -> Result<(), csv::Error> {
    let staging = staging_path(path);
    let file = File::create(&staging)?;
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(file);

    for link in links {
        writer.write_record([link.principal_id.to_string().as_str(), link.external_name.as_str()])?;
    }
    writer.flush()?;
    let file = writer
        .into_inner()
        .map_err(|err| csv::Error::from(io::Error::new(io::ErrorKind::Other, err.to_string())))?;
    file.sync_all()?;
    drop(file);

    if let Err(err) = fs::rename(&staging, path) {
        let _ = fs::remove_file(&staging);
        return Err(err.into());
    }
    Ok(())
}
