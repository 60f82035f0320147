//! Builds argument vectors for the extractor and transcoder invocations (§6).

/// Flags shared by every extractor invocation regardless of mode.
const COMMON_FLAGS: &[&str] = &["--no-playlist", "--no-warnings", "--no-call-home"];

pub fn analyze_args(url: &str) -> Vec<String> {
    let mut args: Vec<String> = vec!["--dump-json".to_string()];
    args.extend(COMMON_FLAGS.iter().map(|s| s.to_string()));
    args.push(url.to_string());
    args
}

pub fn stream_args(url: &str, format_id: &str) -> Vec<String> {
    let mut args: Vec<String> = vec!["-f".to_string(), format_id.to_string(), "--prefer-free-formats".to_string(), "-o".to_string(), "-".to_string()];
    args.extend(COMMON_FLAGS.iter().map(|s| s.to_string()));
    args.push(url.to_string());
    args
}

pub fn convert_source_args(url: &str) -> Vec<String> {
    let mut args: Vec<String> = vec!["-f".to_string(), "best".to_string(), "-o".to_string(), "-".to_string()];
    args.extend(COMMON_FLAGS.iter().map(|s| s.to_string()));
    args.push(url.to_string());
    args
}

/// Per-target transcoder flags; `None` for an unrecognized target format.
pub fn transcoder_args(target_format: &str) -> Option<Vec<String>> {
    let tail: &[&str] = match target_format {
        "mp3" => &["-vn", "-acodec", "libmp3lame", "-ab", "192k", "-ar", "44100", "-f", "mp3"],
        "aac" => &["-vn", "-acodec", "aac", "-ab", "192k", "-ar", "44100", "-f", "adts"],
        "mp4" => &["-c", "copy", "-f", "mp4", "-movflags", "frag_keyframe+empty_moov"],
        "webm" => &["-c", "copy", "-f", "webm"],
        _ => return None,
    };
    let mut args: Vec<String> = vec!["-i".to_string(), "pipe:0".to_string()];
    args.extend(tail.iter().map(|s| s.to_string()));
    args.push("pipe:1".to_string());
    Some(args)
}

/// Content-type table for the final container extension (§6).
pub fn mime_for_ext(ext: &str) -> &'static str {
    match ext {
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "mp3" => "audio/mpeg",
        "m4a" => "audio/mp4",
        "aac" => "audio/aac",
        "ogg" => "audio/ogg",
        "opus" => "audio/opus",
        "flac" => "audio/flac",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn analyze_args_include_dump_json_and_common_flags() {
        let args = analyze_args("https://example.test/v");
        assert!(args.contains(&"--dump-json".to_string()));
        assert!(args.contains(&"--no-call-home".to_string()));
        assert_eq!(args.last().unwrap(), "https://example.test/v");
    }

    #[test]
    fn stream_args_select_format_and_stdout() {
        let args = stream_args("https://example.test/v", "22");
        assert_eq!(args[0], "-f");
        assert_eq!(args[1], "22");
        assert!(args.contains(&"-o".to_string()));
    }

    #[test]
    fn transcoder_args_unknown_target_is_none() {
        assert!(transcoder_args("flv").is_none());
    }

    #[test]
    fn transcoder_args_mp3_has_expected_flags() {
        let args = transcoder_args("mp3").unwrap();
        assert!(args.contains(&"libmp3lame".to_string()));
        assert_eq!(args.first().unwrap(), "-i");
        assert_eq!(args.last().unwrap(), "pipe:1");
    }

    #[test]
    fn mime_table_has_fallback() {
        assert_eq!(mime_for_ext("mp4"), "video/mp4");
        assert_eq!(mime_for_ext("xyz"), "application/octet-stream");
    }
}
