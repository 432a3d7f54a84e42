//! Static log corpora and fixture-file helpers.
//!
//! The corpora are representative slices of real suite output: mostly noise
//! the parser must ignore, with the status-bearing lines the harnesses
//! assert on. Dated fixture files follow the suite's
//! `<file_root>-<YYYY-MM-DD>.log` naming.

use std::path::{Path, PathBuf};

/// A slice of MMDVMHost output around one DMR exchange. Only four of these
/// lines mean anything to the status model.
pub const CORPUS_MMDVMHOST: &[&str] = &[
    "M: 2025-08-06 12:00:00.001 MMDVM protocol version: 2, description: MMDVM_HS_Hat-v1.5.2 20201124",
    "I: 2025-08-06 12:00:00.105 Started the DMR Id lookup reload thread",
    "M: 2025-08-06 12:00:01.000 DMR, Connection to 44.131.4.1 opened",
    "M: 2025-08-06 12:00:02.000 Mode set to DMR",
    "M: 2025-08-06 12:00:02.500 DMR Slot 2, received network voice header from 2345678 to TG 2345",
    "D: 2025-08-06 12:00:02.600 DMR Slot 2, audio sequence no. 0",
    "D: 2025-08-06 12:00:02.700 DMR Talker Alias (Data Format 1, Received 6/17 char): 'G0ABC'",
    "M: 2025-08-06 12:00:06.700 DMR Slot 2, received network end of voice transmission from 2345678 to TG 2345",
    "M: 2025-08-06 12:00:11.000 Mode set to IDLE",
];

/// DMRGateway output: login, then a master drop and recovery.
pub const CORPUS_DMRGATEWAY: &[&str] = &[
    "I: 2025-08-06 11:59:58.000 DMRGateway-20180803 is starting",
    "M: 2025-08-06 11:59:59.000 MMDVM has connected",
    "M: 2025-08-06 12:00:00.000 BrandMeister, Logged into the master successfully",
    "W: 2025-08-06 12:10:00.000 BrandMeister, Connection to the master has timed out, retrying connection",
    "M: 2025-08-06 12:10:30.000 BrandMeister, Logged into the master successfully",
];

/// YSFGateway output, including the advisory reconnect phrase that must not
/// flip link state.
pub const CORPUS_YSFGATEWAY: &[&str] = &[
    "M: 2025-08-06 11:59:50.000 Link successful to MMDVM",
    "M: 2025-08-06 11:59:55.000 Automatic (re-)connection to 41575 - \"CA Ragchew\"",
    "M: 2025-08-06 12:00:00.000 Linked to CA Ragchew",
    "M: 2025-08-06 12:05:00.000 Disconnect has been requested",
];

/// Write `lines` as `<file_root>-<date>.log` inside `dir` and return the
/// path. `date` is `YYYY-MM-DD`.
pub fn write_dated_log(dir: &Path, file_root: &str, date: &str, lines: &[&str]) -> PathBuf {
    let path = dir.join(format!("{file_root}-{date}.log"));
    let mut content = lines.join("\n");
    if !content.is_empty() {
        content.push('\n');
    }
    std::fs::write(&path, content).unwrap();
    path
}

/// Append `lines` to an existing log file, completing each with a newline.
pub fn append_lines(path: &Path, lines: &[&str]) {
    use std::io::Write;
    let mut file = std::fs::OpenOptions::new().append(true).open(path).unwrap();
    for line in lines {
        writeln!(file, "{line}").unwrap();
    }
}

/// Today's date in the dated-file naming, UTC.
pub fn today() -> String {
    chrono::Utc::now().format("%Y-%m-%d").to_string()
}

/// Yesterday's date in the dated-file naming, UTC.
pub fn yesterday() -> String {
    let date = chrono::Utc::now().date_naive();
    date.pred_opt().unwrap_or(date).format("%Y-%m-%d").to_string()
}
