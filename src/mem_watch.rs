// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! Memory usage monitoring. Currently only supported on Linux; degrades
//! to a logged warning and a zero reading everywhere else.

use std::fs::File;
use std::io::{Error, ErrorKind, Read, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::warn;
use nom::bytes::streaming::tag;
use nom::character::complete::digit1;
use nom::combinator::map_res;
use nom::multi::count;
use nom::sequence::{terminated, tuple};
use nom::IResult;

/// Memory usage information parsed from `/proc/[pid]/statm`.
///
/// All values are in units of pages. See `man 5 proc`.
#[derive(Debug, Default, PartialEq, Eq, Hash)]
pub struct Statm {
    pub size: usize,
    pub resident: usize,
    pub share: usize,
    pub text: usize,
    pub data: usize,
}

/// Samples resident memory on a background thread and tracks the peak
/// observed. An embedder polls [`MemoryWatcher::peak_resident_kb`] (or
/// pairs it with its own threshold check) to decide when to call
/// [`crate::solver::IfdsSolver::force_terminate`].
pub struct MemoryWatcher {
    init_resident_pages: usize,
    max_resident_pages: Arc<AtomicU64>,
    running: Arc<std::sync::atomic::AtomicBool>,
    handle: Option<JoinHandle<()>>,
    poll_interval: Duration,
}

impl MemoryWatcher {
    pub fn new() -> Self {
        Self::with_poll_interval(Duration::from_millis(100))
    }

    pub fn with_poll_interval(poll_interval: Duration) -> Self {
        let init_resident_pages = match statm_self() {
            Ok(statm) => statm.resident,
            Err(e) => {
                warn!("unable to read initial resident memory: {e}");
                0
            }
        };
        MemoryWatcher {
            init_resident_pages,
            max_resident_pages: Arc::new(AtomicU64::new(0)),
            running: Arc::new(std::sync::atomic::AtomicBool::new(false)),
            handle: None,
            poll_interval,
        }
    }

    pub fn start(&mut self) {
        self.running.store(true, Ordering::SeqCst);
        let max_resident = self.max_resident_pages.clone();
        let running = self.running.clone();
        let poll_interval = self.poll_interval;
        self.handle = Some(thread::spawn(move || {
            while running.load(Ordering::SeqCst) {
                if let Ok(statm) = statm_self() {
                    max_resident.fetch_max(statm.resident as u64, Ordering::SeqCst);
                }
                thread::sleep(poll_interval);
            }
        }));
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }

    pub fn init_resident_kb(&self) -> u64 {
        pages_to_kb(self.init_resident_pages as u64)
    }

    pub fn peak_resident_kb(&self) -> u64 {
        pages_to_kb(self.max_resident_pages.load(Ordering::SeqCst))
    }
}

impl Default for MemoryWatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for MemoryWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

const PAGE_SIZE_KB: u64 = 4;

fn pages_to_kb(pages: u64) -> u64 {
    pages * PAGE_SIZE_KB
}

fn parse_usize(input: &str) -> IResult<&str, usize> {
    map_res(digit1, |s: &str| s.parse::<usize>())(input)
}

/// Parses the statm file format: `size resident shared text lib data dt`.
fn parse_statm(input: &str) -> IResult<&str, Statm> {
    tuple((count(terminated(parse_usize, tag(" ")), 6), parse_usize))(input).map(
        |(next_input, res)| {
            let statm = Statm {
                size: res.0[0],
                resident: res.0[1],
                share: res.0[2],
                text: res.0[3],
                data: res.0[5],
            };
            (next_input, statm)
        },
    )
}

fn map_result<T>(result: IResult<&str, T>) -> Result<T> {
    match result {
        Ok((remaining, val)) if remaining.is_empty() => Ok(val),
        Ok((remaining, _)) => Err(Error::new(
            ErrorKind::InvalidInput,
            format!("unable to parse whole input, remaining: {:?}", remaining),
        )),
        Err(err) => Err(Error::new(
            ErrorKind::InvalidInput,
            format!("unable to parse input: {:?}", err),
        )),
    }
}

fn statm_file(file: &mut File) -> Result<Statm> {
    let mut buf = String::new();
    file.read_to_string(&mut buf)?;
    map_result(parse_statm(buf.trim()))
}

pub fn statm_self() -> Result<Statm> {
    statm_file(&mut File::open("/proc/self/statm")?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_well_formed_statm_line() {
        let input = "1234 567 89 10 0 11 0";
        let (_, statm) = parse_statm(input).expect("parse succeeds");
        assert_eq!(statm.size, 1234);
        assert_eq!(statm.resident, 567);
        assert_eq!(statm.share, 89);
        assert_eq!(statm.text, 10);
        assert_eq!(statm.data, 11);
    }

    #[test]
    fn pages_convert_to_kilobytes() {
        assert_eq!(pages_to_kb(1), 4);
        assert_eq!(pages_to_kb(256), 1024);
    }

    #[test]
    fn missing_statm_path_is_reported_as_an_error_not_a_panic() {
        assert!(File::open("/nonexistent/statm").is_err());
    }
}
