//! Normalizes raw extractor JSON into the public format model (spec §3, §4.2).

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatKind {
    Audio,
    Video,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormatDescriptor {
    pub format_id: String,
    pub container_ext: String,
    pub resolution: String,
    pub filesize: String,
    pub kind: FormatKind,
    /// Supplemented field (SPEC_FULL §"Supplemented features" #2): the
    /// extractor's raw fps, when present.
    pub fps: Option<f64>,
    /// Supplemented field: the extractor's free-form format note
    /// (e.g. "1080p60"), when present.
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaInfo {
    pub title: String,
    pub thumbnail: Option<String>,
    pub duration: String,
    pub formats: Vec<FormatDescriptor>,
}

/// Container extension canonicalization table (spec §4.2).
fn canonical_ext(ext: &str) -> String {
    match ext {
        "m4a" | "m4v" => "mp4".to_string(),
        "webma" | "webmv" => "webm".to_string(),
        "ogg" => "opus".to_string(),
        other => other.to_string(),
    }
}

/// Manifest-style formats that never represent a downloadable file.
fn is_manifest_format(ext: &str) -> bool {
    matches!(ext, "m3u8" | "m3u8_native" | "mhtml" | "mpd")
}

fn is_none(codec: Option<&str>) -> bool {
    codec.map(|c| c.is_empty() || c.eq_ignore_ascii_case("none")).unwrap_or(true)
}

/// Parse `extractor --dump-json` stdout into a normalized [`MediaInfo`].
pub fn parse_media_info(json: &Value) -> MediaInfo {
    let title = json["title"].as_str().unwrap_or("Unknown").to_string();
    let thumbnail = json["thumbnail"].as_str().map(str::to_string);
    let duration = format_duration(json["duration"].as_f64());

    let raw_formats = json["formats"].as_array().cloned().unwrap_or_default();
    let mut formats: Vec<FormatDescriptor> = Vec::new();

    for f in &raw_formats {
        let Some(format_id) = f["format_id"].as_str() else {
            continue;
        };
        let Some(ext) = f["ext"].as_str() else {
            continue;
        };
        if is_manifest_format(ext) {
            continue;
        }

        let vcodec = f["vcodec"].as_str();
        let acodec = f["acodec"].as_str();
        let has_video = !is_none(vcodec);
        let has_audio = !is_none(acodec);
        if !has_video && !has_audio {
            continue;
        }

        let width = f["width"].as_u64();
        let height = f["height"].as_u64();
        if !has_video && has_audio {
            // audio-only, fine
        } else if has_video && width.is_none() && height.is_none() && f["resolution"].as_str().is_none() {
            // video entry with no dimension hint at all — skip per spec §4.2
            continue;
        }

        let kind = if has_video { FormatKind::Video } else { FormatKind::Audio };

        let resolution = resolve_resolution(f["resolution"].as_str(), width, height, kind);
        let filesize = resolve_filesize(f["filesize"].as_u64(), f["filesize_approx"].as_u64());

        formats.push(FormatDescriptor {
            format_id: format_id.to_string(),
            container_ext: canonical_ext(ext),
            resolution,
            filesize,
            kind,
            fps: f["fps"].as_f64(),
            note: f["format_note"].as_str().map(str::to_string),
        });
    }

    dedup_formats(&mut formats);
    sort_formats(&mut formats);

    MediaInfo { title, thumbnail, duration, formats }
}

fn resolve_resolution(raw: Option<&str>, width: Option<u64>, height: Option<u64>, kind: FormatKind) -> String {
    if kind == FormatKind::Audio {
        return "audio".to_string();
    }
    if let Some(r) = raw {
        if is_wxh(r) || is_np(r) {
            return r.to_string();
        }
    }
    match (width, height) {
        (Some(w), Some(h)) => format!("{}x{}", w, h),
        (None, Some(h)) => format!("{}p", h),
        _ => "unknown".to_string(),
    }
}

fn is_wxh(s: &str) -> bool {
    let Some((w, h)) = s.split_once('x') else { return false };
    !w.is_empty() && !h.is_empty() && w.chars().all(|c| c.is_ascii_digit()) && h.chars().all(|c| c.is_ascii_digit())
}

fn is_np(s: &str) -> bool {
    s.strip_suffix('p').map(|n| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit())).unwrap_or(false)
}

fn resolve_filesize(exact: Option<u64>, approx: Option<u64>) -> String {
    if let Some(b) = exact {
        return human_bytes(b);
    }
    if let Some(b) = approx {
        return format!("~{}", human_bytes(b));
    }
    "unknown".to_string()
}

fn human_bytes(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;
    let b = bytes as f64;
    if b >= GB {
        format!("{:.2} GB", b / GB)
    } else if b >= MB {
        format!("{:.2} MB", b / MB)
    } else if b >= KB {
        format!("{:.1} KB", b / KB)
    } else {
        format!("{} B", bytes)
    }
}

fn numeric_resolution_key(resolution: &str) -> u64 {
    if let Some(n) = resolution.strip_suffix('p') {
        return n.parse().unwrap_or(0);
    }
    if let Some((_, h)) = resolution.split_once('x') {
        return h.parse().unwrap_or(0);
    }
    0
}

/// Dedup by `(kind, ext, resolution)`, preferring the entry with a known size.
fn dedup_formats(formats: &mut Vec<FormatDescriptor>) {
    let mut kept: Vec<FormatDescriptor> = Vec::with_capacity(formats.len());
    'outer: for f in formats.drain(..) {
        for existing in kept.iter_mut() {
            if existing.kind == f.kind && existing.container_ext == f.container_ext && existing.resolution == f.resolution {
                let existing_known = existing.filesize != "unknown";
                let new_known = f.filesize != "unknown";
                if !existing_known && new_known {
                    *existing = f;
                }
                continue 'outer;
            }
        }
        kept.push(f);
    }
    *formats = kept;
}

/// Video before audio; within each, descending numeric resolution.
fn sort_formats(formats: &mut [FormatDescriptor]) {
    formats.sort_by(|a, b| {
        let kind_order = |k: FormatKind| if k == FormatKind::Video { 0 } else { 1 };
        kind_order(a.kind)
            .cmp(&kind_order(b.kind))
            .then_with(|| numeric_resolution_key(&b.resolution).cmp(&numeric_resolution_key(&a.resolution)))
    });
}

fn format_duration(seconds: Option<f64>) -> String {
    let Some(secs) = seconds else {
        return "unknown".to_string();
    };
    let total = secs.round() as u64;
    let h = total / 3600;
    let m = (total % 3600) / 60;
    let s = total % 60;
    if h > 0 {
        format!("{}:{:02}:{:02}", h, m, s)
    } else {
        format!("{}:{:02}", m, s)
    }
}
