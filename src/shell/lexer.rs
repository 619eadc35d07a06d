//! Quote- and escape-aware splitting of a command line into words.
//!
//! - bare: whitespace separates words, `\x` yields `x`
//! - `'…'`: verbatim, no escapes
//! - `"…"`: `\n`, `\t`, `\"`, `\\` are escapes; any other `\x` yields `x`
//!
//! An unterminated quote runs to the end of input. `""` is an empty word.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Bare,
    Single,
    Double,
}

pub fn tokenize(input: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    // A word has started even if it is still empty (e.g. `""`).
    let mut in_word = false;
    let mut mode = Mode::Bare;
    let mut chars = input.chars();

    while let Some(c) = chars.next() {
        match mode {
            Mode::Bare => match c {
                c if c.is_whitespace() => {
                    if in_word {
                        tokens.push(std::mem::take(&mut current));
                        in_word = false;
                    }
                }
                '\'' => {
                    mode = Mode::Single;
                    in_word = true;
                }
                '"' => {
                    mode = Mode::Double;
                    in_word = true;
                }
                '\\' => {
                    current.push(chars.next().unwrap_or('\\'));
                    in_word = true;
                }
                c => {
                    current.push(c);
                    in_word = true;
                }
            },
            Mode::Single => match c {
                '\'' => mode = Mode::Bare,
                c => current.push(c),
            },
            Mode::Double => match c {
                '"' => mode = Mode::Bare,
                '\\' => match chars.next() {
                    Some('n') => current.push('\n'),
                    Some('t') => current.push('\t'),
                    Some(other) => current.push(other),
                    None => current.push('\\'),
                },
                c => current.push(c),
            },
        }
    }

    if in_word {
        tokens.push(current);
    }
    tokens
}
