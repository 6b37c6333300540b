use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;
use tracing_subscriber::fmt::MakeWriter;

const FILE_PREFIX: &str = "daily-bot-";
const FILE_SUFFIX: &str = ".log";

pub(crate) fn log_file_name(date: NaiveDate) -> String {
    format!("{}{}{}", FILE_PREFIX, date.format("%Y-%m-%d"), FILE_SUFFIX)
}

/// The day's log file, reopened when the local date rolls over.
struct DailyFile {
    dir: PathBuf,
    date: Option<NaiveDate>,
    file: Option<File>,
}

impl DailyFile {
    fn current(&mut self) -> Option<&mut File> {
        let today = Local::now().date_naive();
        if self.date != Some(today) || self.file.is_none() {
            self.file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(self.dir.join(log_file_name(today)))
                .ok();
            self.date = Some(today);
        }
        self.file.as_mut()
    }
}

/// Tees every formatted line to stdout and the daily log file.
#[derive(Clone)]
pub(crate) struct TeeMakeWriter {
    file: Arc<Mutex<DailyFile>>,
}

impl TeeMakeWriter {
    pub fn new(dir: &Path) -> Self {
        Self {
            file: Arc::new(Mutex::new(DailyFile {
                dir: dir.to_path_buf(),
                date: None,
                file: None,
            })),
        }
    }
}

impl<'a> MakeWriter<'a> for TeeMakeWriter {
    type Writer = TeeWriter;

    fn make_writer(&'a self) -> Self::Writer {
        TeeWriter {
            file: self.file.clone(),
        }
    }
}

pub(crate) struct TeeWriter {
    file: Arc<Mutex<DailyFile>>,
}

impl Write for TeeWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if let Ok(mut daily) = self.file.lock()
            && let Some(file) = daily.current()
        {
            let _ = file.write_all(buf);
        }
        std::io::stdout().write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        if let Ok(mut daily) = self.file.lock()
            && let Some(file) = daily.current()
        {
            let _ = file.flush();
        }
        std::io::stdout().flush()?;
        Ok(())
    }
}

/// Installs the global subscriber. Returns the log directory.
pub fn init(level: &str, data_dir: &Path) -> Result<PathBuf> {
    let log_dir = data_dir.join("logs");
    crate::platform::ensure_private_dir(&log_dir)
        .with_context(|| format!("failed to create log directory {}", log_dir.display()))?;

    let max_level: Level = level
        .parse()
        .with_context(|| format!("invalid log level '{}'", level))?;

    let subscriber = FmtSubscriber::builder()
        .with_max_level(max_level)
        .with_ansi(false)
        .with_writer(TeeMakeWriter::new(&log_dir))
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();
    Ok(log_dir)
}

/// Deletes `daily-bot-YYYY-MM-DD.log` files dated more than `retention_days`
/// before `today`. Other files are left alone.
pub fn cleanup_old_logs(dir: &Path, retention_days: u32, today: NaiveDate) -> usize {
    let Some(cutoff) = today.checked_sub_days(chrono::Days::new(u64::from(retention_days))) else {
        return 0;
    };
    let Ok(entries) = std::fs::read_dir(dir) else {
        return 0;
    };

    let mut removed = 0;
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().to_string();
        let Some(date) = name
            .strip_prefix(FILE_PREFIX)
            .and_then(|rest| rest.strip_suffix(FILE_SUFFIX))
            .and_then(|date| NaiveDate::parse_from_str(date, "%Y-%m-%d").ok())
        else {
            continue;
        };
        if date < cutoff && std::fs::remove_file(entry.path()).is_ok() {
            removed += 1;
        }
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn old_logs_are_removed_and_others_kept() {
        let tmp = tempfile::tempdir().unwrap();
        for name in [
            "daily-bot-2026-01-01.log",
            "daily-bot-2026-03-01.log",
            "daily-bot-2026-03-31.log",
            "notes.txt",
        ] {
            std::fs::write(tmp.path().join(name), "x").unwrap();
        }

        let removed = cleanup_old_logs(tmp.path(), 30, date("2026-04-01"));
        assert_eq!(removed, 2);
        assert!(tmp.path().join("daily-bot-2026-03-31.log").exists());
        assert!(tmp.path().join("notes.txt").exists());
    }

    #[test]
    fn writer_appends_to_todays_file() {
        let tmp = tempfile::tempdir().unwrap();
        let make = TeeMakeWriter::new(tmp.path());

        make.make_writer().write_all(b"first\n").unwrap();
        make.make_writer().write_all(b"second\n").unwrap();

        let path = tmp.path().join(log_file_name(Local::now().date_naive()));
        assert_eq!(std::fs::read_to_string(path).unwrap(), "first\nsecond\n");
    }
}
