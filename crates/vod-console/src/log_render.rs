const MAX_LINE_CHARS: usize = 2048;

enum EscapeMode {
    Esc,
    Csi,
    Osc,
    OscEsc,
    StTerminated,
    StEsc,
}

/// Splits raw worker output into display lines safe to hand to a log
/// panel. Carriage-return rewrites (progress meters) collapse to their
/// final segment; escape sequences and control characters are stripped.
pub fn render_lines(output: &str) -> Vec<String> {
    output
        .split('\n')
        .map(|line| {
            // A download tool redraws progress with '\r'; only the last
            // segment is ever visible on a real terminal.
            let visible = line.rsplit('\r').next().unwrap_or(line);
            strip_controls(visible)
        })
        .collect()
}

pub fn strip_controls(input: &str) -> String {
    let mut out = String::with_capacity(input.len().min(MAX_LINE_CHARS));
    let mut esc_mode: Option<EscapeMode> = None;
    let mut truncated = false;
    let mut char_count = 0usize;

    for c in input.chars() {
        if let Some(mode) = esc_mode.as_ref() {
            match mode {
                EscapeMode::Esc => match c {
                    '[' => esc_mode = Some(EscapeMode::Csi),
                    ']' => esc_mode = Some(EscapeMode::Osc),
                    'P' | 'X' | '^' | '_' => esc_mode = Some(EscapeMode::StTerminated),
                    _ => esc_mode = None,
                },
                EscapeMode::Csi => {
                    if ('@'..='~').contains(&c) {
                        esc_mode = None;
                    }
                }
                EscapeMode::Osc => {
                    if c == '\x07' {
                        esc_mode = None;
                    } else if c == '\x1b' {
                        esc_mode = Some(EscapeMode::OscEsc);
                    }
                }
                EscapeMode::OscEsc => {
                    if c == '\\' {
                        esc_mode = None;
                    } else if c != '\x1b' {
                        esc_mode = Some(EscapeMode::Osc);
                    }
                }
                EscapeMode::StTerminated => {
                    if c == '\x1b' {
                        esc_mode = Some(EscapeMode::StEsc);
                    }
                }
                EscapeMode::StEsc => {
                    if c == '\\' {
                        esc_mode = None;
                    } else if c != '\x1b' {
                        esc_mode = Some(EscapeMode::StTerminated);
                    }
                }
            }
            continue;
        }

        if c == '\x1b' {
            esc_mode = Some(EscapeMode::Esc);
            continue;
        }
        if c == '\t' {
            out.push(' ');
            char_count += 1;
        } else if c.is_control() || is_format_control(c) {
            continue;
        } else {
            out.push(c);
            char_count += 1;
        }

        if char_count >= MAX_LINE_CHARS {
            truncated = true;
            break;
        }
    }

    if truncated {
        out.push_str(" ...[truncated]");
    }

    out
}

fn is_format_control(c: char) -> bool {
    c == '\u{061C}'
        || c == '\u{200E}'
        || c == '\u{200F}'
        || ('\u{202A}'..='\u{202E}').contains(&c)
        || ('\u{2066}'..='\u{2069}').contains(&c)
}
