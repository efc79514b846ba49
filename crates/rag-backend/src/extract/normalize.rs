/// Text normalization for the extraction pipeline.
pub struct TextNormalizer;

impl TextNormalizer {
    /// Apply normalization rules to extracted text.
    ///
    /// - Remove C0 control characters (except tab/newline/CR).
    /// - Normalize CRLF/CR to LF.
    /// - Collapse runs of spaces/tabs within lines.
    /// - Strip leading/trailing whitespace per line and drop emptied lines.
    ///
    /// Idempotent: `normalize(normalize(x)) == normalize(x)`.
    pub fn normalize(text: &str) -> String {
        if text.is_empty() {
            return String::new();
        }

        let folded = text.replace("\r\n", "\n").replace('\r', "\n");

        let mut lines: Vec<String> = Vec::new();
        for line in folded.split('\n') {
            let cleaned: String = line.chars().filter(|c| !is_stripped_control(*c)).collect();
            let collapsed = cleaned
                .split([' ', '\t'])
                .filter(|part| !part.is_empty())
                .collect::<Vec<_>>()
                .join(" ");
            if !collapsed.is_empty() {
                lines.push(collapsed);
            }
        }

        lines.join("\n")
    }

    /// A page is empty when it is whitespace-only or has fewer than three
    /// tokens after normalization.
    pub fn is_empty_page(text: &str) -> bool {
        if text.trim().is_empty() {
            return true;
        }
        text.split_whitespace().count() < 3
    }
}

fn is_stripped_control(c: char) -> bool {
    matches!(c, '\u{00}'..='\u{08}' | '\u{0b}' | '\u{0c}' | '\u{0e}'..='\u{1f}')
}
