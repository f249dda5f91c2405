use std::{fs, path::Path, path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use collision::CollisionMap;
use db::SqliteCollisionMap;
use fingerprint::SubFingerprint;
use matching::Match;
use processor::MatchFilterMode;
use profile::Profile;
use store::FingerprintStore;
use tracing::{debug, info};
use track::TrackId;

pub mod collision;
pub mod db;
pub mod error;
pub mod fingerprint;
pub mod ingest;
pub mod matching;
pub mod processor;
pub mod profile;
pub mod scoring;
pub mod store;
pub mod threshold;
pub mod track;
pub mod utils;

pub use error::Error;
pub use fingerprint::SubFingerprintHash;

/// Options of a match run.
#[derive(Debug, Clone, Default)]
pub struct MatchOptions {
    pub profile: Option<PathBuf>,
    pub sqlite: Option<PathBuf>,
    pub dedup: bool,
    pub filter: Option<MatchFilterMode>,
    pub window: Option<Duration>,
}

/// Reads the sub-fingerprints of one track from a JSON array of
/// `{"index": .., "hash": .., "variation": ..}` objects.
pub fn read_track(path: &Path) -> Result<Vec<SubFingerprint>> {
    let content =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let sub_fingerprints: Vec<SubFingerprint> = serde_json::from_str(&content)
        .with_context(|| format!("parsing {}", path.display()))?;
    Ok(sub_fingerprints)
}

fn track_name(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn load_tracks<M: CollisionMap>(store: &FingerprintStore<M>, track_files: &[PathBuf]) -> Result<()> {
    for (id, path) in track_files.iter().enumerate() {
        let track = TrackId(id as u32);
        let sub_fingerprints = read_track(path)?;
        store
            .add(track, &sub_fingerprints)
            .with_context(|| format!("adding {}", path.display()))?;
        debug!("track {} is {}", track, path.display());
    }
    Ok(())
}

/// Indexes the given tracks and prints the matches found between them.
pub fn match_files(track_files: &[PathBuf], options: &MatchOptions) -> Result<()> {
    let profile = Profile::load(options.profile.as_deref())?;
    info!("matching {} tracks with profile {}", track_files.len(), profile.name);

    let matches = match &options.sqlite {
        Some(db_path) => {
            let map = SqliteCollisionMap::open(db_path)?;
            find_matches(FingerprintStore::with_collision_map(profile, map)?, track_files, options)?
        }
        None => find_matches(FingerprintStore::new(profile)?, track_files, options)?,
    };

    let names: Vec<String> = track_files.iter().map(|path| track_name(path)).collect();
    for (index, m) in matches.iter().enumerate() {
        println!(
            "{}. {} @ {:.3}s <-> {} @ {:.3}s (similarity: {:.3}, {})",
            index + 1,
            names[m.track1.0 as usize],
            m.track1_time.as_secs_f64(),
            names[m.track2.0 as usize],
            m.track2_time.as_secs_f64(),
            m.similarity,
            m.source
        );
    }
    Ok(())
}

fn find_matches<M: CollisionMap>(
    store: FingerprintStore<M>,
    track_files: &[PathBuf],
    options: &MatchOptions,
) -> Result<Vec<Match>> {
    load_tracks(&store, track_files)?;

    let mut last_report = 0.0;
    let mut matches = store.find_all_matches(|progress| {
        if progress - last_report >= 10.0 || progress >= 100.0 {
            debug!("searching matches: {:.0}%", progress);
            last_report = progress;
        }
    })?;
    info!("{} matches found", matches.len());

    if options.dedup {
        matches = processor::filter_duplicate_matches(matches, |_| {});
        info!("{} matches after removing duplicates", matches.len());
    }

    let Some(mode) = options.filter else {
        return Ok(matches);
    };

    let mut pairs = processor::track_pairs(&store.track_ids());
    processor::assign_matches(&mut pairs, &matches);

    let mut filtered = Vec::new();
    for pair in pairs.iter().filter(|pair| !pair.matches.is_empty()) {
        match options.window {
            Some(window) => filtered.extend(processor::window_filter(&pair.matches, mode, window)?),
            None => filtered.push(processor::filter(&pair.matches, mode)?),
        }
    }
    Ok(filtered)
}

/// Prints frame and hash counts of the given tracks and how many hashes
/// collide between them.
pub fn print_stats(track_files: &[PathBuf]) -> Result<()> {
    let store = FingerprintStore::new(Profile::default())?;
    load_tracks(&store, track_files)?;

    for (id, path) in track_files.iter().enumerate() {
        let track = TrackId(id as u32);
        println!(
            "{}: {} frames, {} hashes",
            track_name(path),
            store.track_frame_count(track).unwrap_or(0),
            store.track_len(track).unwrap_or(0)
        );
    }

    let colliding = store.read_collision_map(|map| map.colliding_keys())?;
    println!("{} colliding hashes", colliding.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_read_track() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"index": 0, "hash": 5}}, {{"index": 0, "hash": 7, "variation": true}}, {{"index": 1, "hash": 9}}]"#
        )
        .unwrap();

        let sub_fingerprints = read_track(file.path()).unwrap();
        assert_eq!(sub_fingerprints.len(), 3);
        assert_eq!(sub_fingerprints[1].hash, SubFingerprintHash::new(7));
        assert!(sub_fingerprints[1].is_variation);
        assert!(!sub_fingerprints[2].is_variation);
    }

    #[test]
    fn test_read_track_invalid() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"index": 0}}"#).unwrap();
        assert!(read_track(file.path()).is_err());
        assert!(read_track(Path::new("/nonexistent/track.json")).is_err());
    }

    #[test]
    fn test_track_name() {
        assert_eq!(track_name(Path::new("/tmp/song-a.json")), "song-a");
    }

    #[test]
    fn test_find_matches_with_filter() {
        let dir = tempfile::tempdir().unwrap();
        let json: Vec<String> = (0..200)
            .map(|i| format!(r#"{{"index": {}, "hash": {}}}"#, i, i + 1))
            .collect();
        let content = format!("[{}]", json.join(","));
        let paths: Vec<PathBuf> = ["a.json", "b.json"]
            .iter()
            .map(|name| {
                let path = dir.path().join(name);
                fs::write(&path, &content).unwrap();
                path
            })
            .collect();

        let options = MatchOptions {
            dedup: true,
            filter: Some(MatchFilterMode::First),
            ..Default::default()
        };
        let matches =
            find_matches(FingerprintStore::new(Profile::default()).unwrap(), &paths, &options)
                .unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].track1_time, Duration::ZERO);
        assert_eq!(matches[0].similarity, 1.0);
    }
}
