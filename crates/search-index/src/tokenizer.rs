//! Quote-aware tokenization: whitespace mode and CJK-character-split mode,
//! plus the companion field splitter used by the query parser.

const SOFT_DELIMS: [char; 3] = ['.', '-', ':'];

fn is_quote(ch: char) -> bool {
    matches!(ch, '\'' | '"' | '`')
}

fn is_soft_delim(ch: char) -> bool {
    SOFT_DELIMS.contains(&ch)
}

/// Tokenize on whitespace, trimming leading/trailing `.`, `-`, `:` (and any
/// other punctuation not explicitly kept) from each token.
#[must_use]
pub fn whitespace_tokenize(s: &str, keep: &[char]) -> Vec<String> {
    tokenize(s, false, keep)
}

/// Tokenize on whitespace, additionally splitting every Han-range character
/// out as its own single-character token.
#[must_use]
pub fn hanzi_tokenize(s: &str, keep: &[char]) -> Vec<String> {
    tokenize(s, true, keep)
}

fn is_han(ch: char) -> bool {
    // Matches the common CJK Unified Ideographs blocks; narrower than
    // Unicode's full `Han` script property but covers the characters this
    // service's documents are expected to contain.
    matches!(ch,
        '\u{2E80}'..='\u{2EFF}'   // CJK Radicals Supplement
        | '\u{3400}'..='\u{4DBF}' // CJK Unified Ideographs Extension A
        | '\u{4E00}'..='\u{9FFF}' // CJK Unified Ideographs
        | '\u{F900}'..='\u{FAFF}' // CJK Compatibility Ideographs
        | '\u{20000}'..='\u{2A6DF}' // CJK Unified Ideographs Extension B
    )
}

fn tokenize(s: &str, break_hz: bool, keep: &[char]) -> Vec<String> {
    if s.is_empty() {
        return Vec::new();
    }

    let mut tokens = Vec::new();
    let mut buf = String::new();
    let mut has_quote = false;
    let mut quote: char = '\0';
    let mut remaining = s.to_string();

    loop {
        let chars: Vec<char> = remaining.chars().collect();
        let mut i = 0;
        while i < chars.len() {
            let ch = chars[i];
            if is_quote(ch) {
                if has_quote {
                    if quote == ch {
                        has_quote = false;
                        if !keep.is_empty() {
                            buf.push(ch);
                        }
                        dump_token(&mut buf, keep, &mut tokens);
                    } else {
                        buf.push(ch);
                    }
                } else {
                    has_quote = true;
                    quote = ch;
                    dump_token(&mut buf, keep, &mut tokens);
                    if !keep.is_empty() {
                        buf.push(ch);
                    }
                }
                i += 1;
                continue;
            }

            if has_quote {
                buf.push(ch);
                i += 1;
                continue;
            }

            if ch.is_whitespace() {
                dump_token(&mut buf, keep, &mut tokens);
                i += 1;
                continue;
            }

            if is_punct_like(ch) {
                let is_kept = keep.contains(&ch);
                let is_soft = is_soft_delim(ch);
                if keep.is_empty() {
                    if !is_soft {
                        dump_token(&mut buf, keep, &mut tokens);
                        i += 1;
                        continue;
                    }
                } else if !is_kept && !is_soft {
                    dump_token(&mut buf, keep, &mut tokens);
                    i += 1;
                    continue;
                }
            }

            if break_hz && is_han(ch) {
                dump_token(&mut buf, keep, &mut tokens);
                tokens.push(ch.to_string());
                i += 1;
                continue;
            }

            buf.push(ch);
            i += 1;
        }

        if has_quote {
            has_quote = false;
            let recovered = std::mem::take(&mut buf);
            remaining = if keep.is_empty() {
                recovered
            } else {
                recovered.chars().skip(1).collect()
            };
            continue;
        }

        dump_token(&mut buf, keep, &mut tokens);
        break;
    }

    tokens
}

fn is_punct_like(ch: char) -> bool {
    // `char::is_ascii_punctuation` misses non-ASCII punctuation such as curly
    // quotes or CJK full-width punctuation; approximate Go's `unicode.IsPunct`
    // with Unicode's general category via `char::is_alphanumeric` exclusion,
    // already applied by the caller. This helper exists only for readability
    // at the call site.
    !ch.is_alphanumeric() && !ch.is_whitespace()
}

fn dump_token(buf: &mut String, keep: &[char], tokens: &mut Vec<String>) {
    if buf.is_empty() {
        return;
    }
    let trimmed: String = if keep.is_empty() {
        buf.trim_matches(|c| is_soft_delim(c)).to_string()
    } else {
        buf.trim_matches(|c: char| !keep.contains(&c) && is_soft_delim(c)).to_string()
    };
    if !trimmed.is_empty() {
        tokens.push(trimmed);
    }
    buf.clear();
}

/// Split `s` on the given delimiter set (or whitespace if `delims` is empty),
/// respecting `'`, `"`, `` ` `` quoting: delimiters inside a quoted run are
/// not treated as separators, and the quote characters themselves remain
/// part of the emitted field.
#[must_use]
pub fn fields_keep_quote(s: &str, delims: &[char]) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut has_quote = false;
    let mut quote: char = '\0';

    for ch in s.chars() {
        let is_sep = if is_quote(ch) {
            if has_quote {
                if quote == ch {
                    has_quote = false;
                }
            } else {
                has_quote = true;
                quote = ch;
            }
            false
        } else if has_quote {
            false
        } else if delims.is_empty() {
            ch.is_whitespace()
        } else {
            delims.contains(&ch)
        };

        if is_sep {
            if !current.is_empty() {
                fields.push(std::mem::take(&mut current));
            }
        } else {
            current.push(ch);
        }
    }
    if !current.is_empty() {
        fields.push(current);
    }
    fields
}
