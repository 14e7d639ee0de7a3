// src/seeds/config.rs
use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::Path;

use super::SeedSet;

/// Load a seed override from an explicit path. Supports TOML or JSON formats.
pub fn load_override_from(path: &Path) -> Result<SeedSet> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading seed override from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_override(&content, ext.as_str())
        .with_context(|| format!("parsing seed override {}", path.display()))
}

fn parse_override(s: &str, hint_ext: &str) -> Result<SeedSet> {
    match hint_ext {
        "toml" => return Ok(toml::from_str(s)?),
        "json" => return Ok(serde_json::from_str(s)?),
        _ => {}
    }
    // No usable extension: try JSON first (cheap to reject), then TOML.
    if let Ok(v) = serde_json::from_str::<SeedSet>(s) {
        return Ok(v);
    }
    if let Ok(v) = toml::from_str::<SeedSet>(s) {
        return Ok(v);
    }
    Err(anyhow!("unsupported seed override format"))
}

/// Read a plain keyword list: one keyword per line, blank lines and `#` comments skipped.
pub fn load_keyword_file(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading keyword file {}", path.display()))?;
    Ok(parse_keyword_lines(&content))
}

fn parse_keyword_lines(s: &str) -> Vec<String> {
    s.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Built-in defaults, merged with the optional override file, plus the optional
/// keyword list.
pub fn load_seed_set(
    override_path: Option<&Path>,
    keywords_path: Option<&Path>,
) -> Result<SeedSet> {
    let base = SeedSet::builtin()?;
    let mut merged = match override_path {
        Some(p) => base.merge(&load_override_from(p)?),
        None => base,
    };

    if let Some(p) = keywords_path {
        let extra = SeedSet {
            keywords: load_keyword_file(p)?,
            ..SeedSet::default()
        };
        merged = merged.merge(&extra);
    }

    tracing::info!(
        keywords = merged.keywords.len(),
        genres = merged.genres.len(),
        moods = merged.moods.len(),
        meta = merged.meta.len(),
        locales = merged.locales.len(),
        artists = merged.artists.len(),
        tracks = merged.tracks.len(),
        "seed vocabulary loaded"
    );
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toml_and_json_overrides_parse() {
        let toml = r#"
keywords = ["Sauna", "sauna"]

[[artists]]
name = "Aurora"
aliases = ["AURORA Aksnes"]
"#;
        let t = parse_override(toml, "toml").unwrap().normalized();
        assert_eq!(t.keywords, vec!["sauna"]);
        assert_eq!(t.artists[0].aliases, vec!["AURORA Aksnes"]);

        let json = r#"{"genres": ["synthwave"], "tracks": [{"id": "x1", "name": "Nightcall"}]}"#;
        let j = parse_override(json, "").unwrap();
        assert_eq!(j.genres, vec!["synthwave"]);
        assert_eq!(j.tracks[0].id, "x1");
    }

    #[test]
    fn garbage_override_is_rejected() {
        assert!(parse_override("[[[", "").is_err());
    }

    #[test]
    fn keyword_lines_skip_blanks_and_comments() {
        let kws = parse_keyword_lines("# header\nrunning\n\n  hiit  \n#skip\n");
        assert_eq!(kws, vec!["running", "hiit"]);
    }

    #[test]
    fn load_seed_set_merges_files_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let over = dir.path().join("seeds.json");
        fs::write(&over, r#"{"keywords": ["sauna"]}"#).unwrap();
        let kw = dir.path().join("keywords.txt");
        fs::write(&kw, "hiit\nworkout\n").unwrap();

        let set = load_seed_set(Some(&over), Some(&kw)).unwrap();
        let builtin = SeedSet::builtin().unwrap();
        assert!(set.keywords.starts_with(&builtin.keywords));
        assert!(set.keywords.contains(&"sauna".to_string()));
        assert!(set.keywords.contains(&"hiit".to_string()));
        assert_eq!(
            set.keywords.iter().filter(|k| k.as_str() == "workout").count(),
            1
        );
    }
}
