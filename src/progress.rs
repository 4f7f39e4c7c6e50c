//! Mapping from pipeline position to the job's 0–100 progress value.
//!
//! | Band | Range | Step |
//! |------|-------|------|
//! | preflight | 0–10 | dependency check, analysis, planning |
//! | chunks | 10–95 | linear in completed chunks |
//! | finalize | 95–100 | merge and publish |
//!
//! Every value produced here is non-decreasing along one run; the registry
//! additionally refuses to lower a stored value.

/// Job accepted, dependencies being checked.
pub const STARTED: u8 = 3;
/// Document analysed.
pub const ANALYZED: u8 = 8;
/// Chunk plan fixed; chunk band starts here.
pub const CHUNKS_START: u8 = 10;
/// All chunks done; merging.
pub const MERGING: u8 = 95;
/// Terminal success.
pub const DONE: u8 = 100;

/// Progress after `done` of `total` chunks have completed.
pub fn chunk_progress(done: usize, total: usize) -> u8 {
    if total == 0 {
        return CHUNKS_START;
    }
    let span = (MERGING - CHUNKS_START) as usize;
    let done = done.min(total);
    CHUNKS_START + (span * done / total) as u8
}
