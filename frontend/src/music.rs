//! Custom-music table: external audio files substituted for regions of a
//! game's MPEG ROM, keyed by ROM start offset.
//!
//! The table is per game; duplicate offsets within one game are logged and
//! ignored (first wins). Each referenced file is loaded once and shared
//! between the tracks pointing at it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use m3_core::device::mpeg::CustomTrack;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct MusicFile {
    #[serde(default)]
    games: Vec<GameEntry>,
}

#[derive(Debug, Deserialize)]
struct GameEntry {
    name: String,
    #[serde(default)]
    track: Vec<TrackEntry>,
}

#[derive(Debug, Deserialize)]
struct TrackEntry {
    mpeg_rom_start_offset: String,
    filepath: String,
    #[serde(default)]
    file_start_offset: Option<String>,
}

fn parse_offset(s: &str) -> Option<u32> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).ok()
    } else {
        s.parse().ok()
    }
}

/// Build the custom-track map for `game_id` from the music table text.
/// Missing or malformed entries are skipped with a log line; the original
/// game tracks play in their place.
pub fn load_tracks(text: &str, game_id: &str) -> HashMap<u32, CustomTrack> {
    let mut out = HashMap::new();
    let parsed: MusicFile = match toml::from_str(text) {
        Ok(parsed) => parsed,
        Err(e) => {
            log::error!("custom music table could not be parsed: {e}; using game tracks");
            return out;
        }
    };

    let mut file_cache: HashMap<PathBuf, Arc<Vec<u8>>> = HashMap::new();
    for game in parsed.games.iter().filter(|g| g.name == game_id) {
        for track in &game.track {
            let Some(rom_offset) = parse_offset(&track.mpeg_rom_start_offset) else {
                log::error!(
                    "custom track for '{game_id}' has a bad mpeg_rom_start_offset and will be ignored"
                );
                continue;
            };
            if out.contains_key(&rom_offset) {
                log::error!(
                    "multiple custom tracks for '{game_id}' MPEG ROM offset {rom_offset:#010x}; only the first will be used"
                );
                continue;
            }
            let file_start = track
                .file_start_offset
                .as_deref()
                .and_then(parse_offset)
                .unwrap_or(0) as usize;

            let path = PathBuf::from(&track.filepath);
            let data = match file_cache.get(&path) {
                Some(data) => Arc::clone(data),
                None => match std::fs::read(&path) {
                    Ok(bytes) => {
                        log::info!("loaded custom track: {}", path.display());
                        let data = Arc::new(bytes);
                        file_cache.insert(path.clone(), Arc::clone(&data));
                        data
                    }
                    Err(e) => {
                        log::error!("unable to load music track {}: {e}", path.display());
                        continue;
                    }
                },
            };
            out.insert(
                rom_offset,
                CustomTrack {
                    data,
                    file_start_offset: file_start,
                },
            );
        }
    }
    out
}

/// Read the music table from disk; absence is not an error.
pub fn load_tracks_from(path: &Path, game_id: &str) -> HashMap<u32, CustomTrack> {
    match std::fs::read_to_string(path) {
        Ok(text) => load_tracks(&text, game_id),
        Err(_) => HashMap::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_offsets_first_wins() {
        let dir = std::env::temp_dir().join("m3emu-music-test");
        std::fs::create_dir_all(&dir).unwrap();
        let a = dir.join("a.mp2");
        let b = dir.join("b.mp2");
        std::fs::write(&a, [1, 2, 3]).unwrap();
        std::fs::write(&b, [4, 5, 6]).unwrap();

        let text = format!(
            r#"
[[games]]
name = "SCUD"

[[games.track]]
mpeg_rom_start_offset = "0x1000"
filepath = "{}"

[[games.track]]
mpeg_rom_start_offset = "0x1000"
filepath = "{}"
"#,
            a.display(),
            b.display()
        );
        let tracks = load_tracks(&text, "SCUD");
        assert_eq!(tracks.len(), 1);
        assert_eq!(*tracks[&0x1000].data, vec![1, 2, 3]);
    }

    #[test]
    fn other_games_are_skipped() {
        let text = r#"
[[games]]
name = "DAYTONA2"

[[games.track]]
mpeg_rom_start_offset = "0"
filepath = "/nonexistent"
"#;
        assert!(load_tracks(text, "SCUD").is_empty());
    }

    #[test]
    fn offsets_parse_hex_and_decimal() {
        assert_eq!(parse_offset("0x2000"), Some(0x2000));
        assert_eq!(parse_offset("4096"), Some(4096));
        assert_eq!(parse_offset("zz"), None);
    }
}
