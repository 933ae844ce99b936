use crate::{config::Config, heuristics::strip_image_tags};
use unicode_normalization::UnicodeNormalization;

/// Normalises OCR markdown before it is parsed, prompted or saved.
pub fn clean_markdown(cfg: &Config, text: &str) -> String {
    let mut s = text.replace("\r\n", "\n");

    if cfg.text.normalize_unicode {
        s = s.nfkc().collect::<String>();
    }

    s = sanitize_control_chars(&s, &cfg.text.control_chars_to_sanitize);

    if cfg.text.strip_image_tags {
        s = strip_image_tags(&s);
    }

    s.split('\n')
        .map(|l| l.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

fn sanitize_control_chars(s: &str, codes: &[u8]) -> String {
    if codes.is_empty() {
        return s.to_string();
    }

    let mut mask = [false; 128];
    for &code in codes {
        if (code as usize) < mask.len() {
            mask[code as usize] = true;
        }
    }

    s.chars()
        .filter(|&ch| {
            // Structural whitespace survives regardless of the mask.
            if ch == '\n' || ch == '\r' || ch == '\t' {
                return true;
            }
            let cp = ch as u32;
            cp >= 128 || !mask[cp as usize]
        })
        .collect()
}

/// Markdown with emphasis and heading markers removed.
pub fn markdown_to_text(md: &str) -> String {
    md.split('\n')
        .map(|line| {
            let line = line.replace("**", "");
            let trimmed = line.trim_start();
            if trimmed.starts_with('#') {
                trimmed.trim_start_matches('#').trim_start().to_string()
            } else {
                line
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markdown_markers_are_dropped() {
        let md = "## **MB2300** Blower\nPowerful **2-stroke** engine\n#tag";
        assert_eq!(markdown_to_text(md), "MB2300 Blower\nPowerful 2-stroke engine\ntag");
    }

    #[test]
    fn image_tags_are_stripped_when_enabled() {
        let mut cfg = Config::default();
        cfg.text.strip_image_tags = true;
        assert_eq!(clean_markdown(&cfg, "a ![x](img-0.jpeg) b"), "a  b");
    }
}
