use std::collections::BTreeMap;

/// Value carried by one advanced-string flag. `Switch` is a bare flag with
/// no argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlagValue {
    Switch,
    Value(String),
}

impl FlagValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FlagValue::Switch => None,
            FlagValue::Value(v) => Some(v.as_str()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvancedToken {
    pub flag: String,
    pub value: FlagValue,
}

/// Parsed form of the free-form advanced-parameter string.
///
/// Parsing never fails: tokens that cannot be attached to a flag are
/// dropped and reported through `dropped()`.
#[derive(Debug, Clone, Default)]
pub struct AdvancedTokens {
    tokens: Vec<AdvancedToken>,
    dropped: Vec<String>,
}

impl AdvancedTokens {
    pub fn parse(raw: &str) -> Self {
        let words = split_quoted(raw);

        let mut tokens = Vec::new();
        let mut dropped = Vec::new();
        let mut i = 0usize;
        while i < words.len() {
            let word = &words[i];
            if word.starts_with('-') {
                let takes_value = words
                    .get(i + 1)
                    .is_some_and(|next| !next.starts_with('-'));
                if takes_value {
                    tokens.push(AdvancedToken {
                        flag: word.clone(),
                        value: FlagValue::Value(words[i + 1].clone()),
                    });
                    i += 2;
                } else {
                    tokens.push(AdvancedToken {
                        flag: word.clone(),
                        value: FlagValue::Switch,
                    });
                    i += 1;
                }
            } else {
                tracing::warn!(token = %word, "ignoring unassociated advanced parameter value");
                dropped.push(word.clone());
                i += 1;
            }
        }

        Self { tokens, dropped }
    }

    pub fn tokens(&self) -> &[AdvancedToken] {
        &self.tokens
    }

    /// Tokens that were discarded because they followed neither a flag nor
    /// a value slot.
    pub fn dropped(&self) -> &[String] {
        &self.dropped
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Lookup view. The last occurrence of a duplicated flag wins.
    pub fn flag_map(&self) -> BTreeMap<String, FlagValue> {
        let mut out = BTreeMap::new();
        for t in &self.tokens {
            out.insert(t.flag.clone(), t.value.clone());
        }
        out
    }

    /// Re-serializes the token sequence. Parsing the result yields the same
    /// flag map as parsing the original input.
    pub fn canonical_string(&self) -> String {
        let mut parts = Vec::with_capacity(self.tokens.len() * 2);
        for t in &self.tokens {
            parts.push(t.flag.clone());
            if let FlagValue::Value(v) = &t.value {
                if v.is_empty() || v.chars().any(char::is_whitespace) {
                    parts.push(format!("\"{v}\""));
                } else {
                    parts.push(v.clone());
                }
            }
        }
        parts.join(" ")
    }
}

// Splits on whitespace while treating quoted spans as atomic. Quote
// characters are stripped from token content; an unterminated quote runs
// to the end of the input rather than failing.
fn split_quoted(raw: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut cur = String::new();
    let mut in_token = false;
    let mut quote: Option<char> = None;

    for c in raw.chars() {
        match quote {
            Some(q) => {
                if c == q {
                    quote = None;
                } else {
                    cur.push(c);
                }
            }
            None => {
                if c == '"' || c == '\'' {
                    quote = Some(c);
                    in_token = true;
                } else if c.is_whitespace() {
                    if in_token {
                        out.push(std::mem::take(&mut cur));
                        in_token = false;
                    }
                } else {
                    cur.push(c);
                    in_token = true;
                }
            }
        }
    }
    if in_token {
        out.push(cur);
    }
    out
}
