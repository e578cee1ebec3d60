//! Daily log files received from the peer
//!
//! Each day gets one file named `log-DD-MM-YYYY.txt` in the log directory.

use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDate};

/// Today's date in local time
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// `DD-MM-YYYY` label used in file names
pub fn label_for(day: NaiveDate) -> String {
    day.format("%d-%m-%Y").to_string()
}

/// Store of dated log files in one directory
#[derive(Debug, Clone)]
pub struct DatedLogStore {
    dir: PathBuf,
}

impl DatedLogStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the log directory if it does not exist yet
    pub fn ensure_dir(&self) -> io::Result<()> {
        fs::create_dir_all(&self.dir)
    }

    /// Path of the file for a `DD-MM-YYYY` label
    pub fn path_for(&self, label: &str) -> PathBuf {
        self.dir.join(format!("log-{label}.txt"))
    }

    /// Read at most `cap` lines of a day's file
    ///
    /// Returns `Ok(None)` if the file does not exist.
    pub fn read(&self, label: &str, cap: usize) -> io::Result<Option<Vec<String>>> {
        let file = match fs::File::open(self.path_for(label)) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };
        let lines = BufReader::new(file)
            .lines()
            .take(cap)
            .collect::<io::Result<Vec<_>>>()?;
        Ok(Some(lines))
    }

    /// Create an empty file for the day, leaving an existing one untouched
    pub fn create_empty(&self, label: &str) -> io::Result<PathBuf> {
        self.ensure_dir()?;
        let path = self.path_for(label);
        OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(path)
    }

    /// Delete a day's file. Returns `false` if there was none.
    pub fn delete(&self, label: &str) -> io::Result<bool> {
        match fs::remove_file(self.path_for(label)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Delete every file in the log directory, returning how many were removed
    pub fn delete_all(&self) -> io::Result<usize> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e),
        };
        let mut removed = 0;
        for entry in entries {
            let path = entry?.path();
            if path.is_file() {
                fs::remove_file(&path)?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Append lines to the file for `label`, creating it if needed
    pub fn append(&self, label: &str, lines: &[String]) -> io::Result<()> {
        self.ensure_dir()?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path_for(label))?;
        let mut buf = String::new();
        for line in lines {
            buf.push_str(line);
            buf.push('\n');
        }
        file.write_all(buf.as_bytes())
    }

    /// Append lines to today's file
    pub fn append_today(&self, lines: &[String]) -> io::Result<()> {
        self.append(&label_for(today()), lines)
    }
}
