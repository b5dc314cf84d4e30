//! Parses the `folder:`/`zip:`/`ftp:` location-spec grammar (§6) into
//! [`Location`] values. Grounded on the original CLI's `parse_location` /
//! `path_utilities.is_valid_path` / `is_valid_file`.

use std::path::PathBuf;

use super::Location;
use crate::error::Error;

/// Parses one location-spec line. Never panics; malformed or unrecognized
/// specs come back as [`Error::SpecInvalid`] so the caller can report and
/// skip the line and continue ingesting the rest.
pub fn parse_spec(spec: &str) -> Result<Location, Error> {
    let spec = spec.trim();
    if spec.is_empty() {
        return Err(Error::SpecInvalid("empty location specification".into()));
    }

    if let Some(rest) = spec.strip_prefix("folder:") {
        return parse_folder(rest);
    }
    if let Some(rest) = spec.strip_prefix("zip:") {
        return parse_zip(rest);
    }
    if let Some(rest) = spec.strip_prefix("ftp:") {
        return parse_ftp(rest);
    }

    Err(Error::SpecInvalid(format!("unknown path type (expected folder:/zip:/ftp:): [{spec}]")))
}

fn parse_folder(path: &str) -> Result<Location, Error> {
    let p = PathBuf::from(path);
    if !p.is_dir() {
        return Err(Error::SpecInvalid(format!("path is not a directory: [{path}]")));
    }
    Ok(Location::Folder { path: p })
}

fn parse_zip(path: &str) -> Result<Location, Error> {
    let p = PathBuf::from(path);
    if !p.is_file() {
        return Err(Error::SpecInvalid(format!("path is not a file: [{path}]")));
    }
    if zip::ZipArchive::new(std::fs::File::open(&p).map_err(|e| {
        Error::SpecInvalid(format!("path is not a valid ZIP archive: [{path}] ({e})"))
    })?)
    .is_err()
    {
        return Err(Error::SpecInvalid(format!("path is not a valid ZIP archive: [{path}]")));
    }
    Ok(Location::Zip { path: p })
}

fn parse_ftp(ftp_spec: &str) -> Result<Location, Error> {
    let invalid = || Error::SpecInvalid(format!("invalid FTP specification: [ftp:{ftp_spec}]"));

    let (creds, rest) = ftp_spec.split_once('@').ok_or_else(invalid)?;
    let (username, password) = creds.split_once(':').ok_or_else(invalid)?;

    let (host, remote_path) = match rest.split_once('/') {
        Some((host, path)) => (host, format!("/{path}")),
        None => (rest, "/".to_string()),
    };

    if username.is_empty() || password.is_empty() || host.is_empty() {
        return Err(invalid());
    }

    Ok(Location::Ftp {
        host: host.to_string(),
        username: username.to_string(),
        password: password.to_string(),
        remote_path,
    })
}
