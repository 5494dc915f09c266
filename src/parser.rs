/// One input line, split into pipeline stages.
#[derive(Debug, PartialEq)]
pub struct Pipeline {
    /// argv for each stage, in pipeline order. Never empty, nor any stage.
    pub stages: Vec<Vec<String>>,
    /// Trailing `&`.
    pub background: bool,
    /// The line as typed, minus a trailing `&`, for job listings.
    pub text: String,
}

#[derive(Debug, PartialEq)]
enum Token {
    /// `pattern` is the word with quoted glob characters escaped, present
    /// only when an unquoted `*`, `?` or `[` makes the word a glob.
    Word {
        text: String,
        pattern: Option<String>,
    },
    Pipe,
    Background,
}

/// States for the tokenizer state machine.
enum State {
    /// Between tokens: whitespace is skipped
    Normal,
    /// Building an unquoted word: whitespace ends it
    InWord,
    /// Inside double quotes: whitespace is preserved, `$?` still expands
    InDoubleQuote,
    /// Inside single quotes: everything is literal
    InSingleQuote,
}

/// Parse a line into a pipeline. `Ok(None)` for a blank line.
///
/// `last_status` is substituted for `$?` outside single quotes; unquoted
/// words containing `*`, `?` or `[` are glob-expanded.
pub fn parse(input: &str, last_status: i32) -> Result<Option<Pipeline>, String> {
    let tokens = tokenize(input, last_status)?;
    if tokens.is_empty() {
        return Ok(None);
    }

    let mut stages = vec![Vec::new()];
    let mut background = false;
    for token in tokens {
        if background {
            return Err("syntax error: `&` must end the command".to_string());
        }
        match token {
            Token::Word { text, pattern } => {
                let stage = stages.last_mut().ok_or("empty pipeline")?;
                match pattern {
                    Some(pattern) => stage.extend(expand_glob(&pattern, text)),
                    None => stage.push(text),
                }
            }
            Token::Pipe => stages.push(Vec::new()),
            Token::Background => background = true,
        }
    }

    if stages.iter().any(Vec::is_empty) {
        return Err("syntax error: empty pipeline stage".to_string());
    }

    let text = input.trim().trim_end_matches('&').trim_end().to_string();
    Ok(Some(Pipeline {
        stages,
        background,
        text,
    }))
}

fn tokenize(input: &str, last_status: i32) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut pattern = String::new();
    let mut globbable = false;
    let mut state = State::Normal;
    let mut chars = input.chars().peekable();

    macro_rules! finish_word {
        () => {
            let word_pattern = std::mem::take(&mut pattern);
            tokens.push(Token::Word {
                text: std::mem::take(&mut current),
                pattern: std::mem::take(&mut globbable).then_some(word_pattern),
            });
        };
    }

    // Quoted, escaped or substituted text never acts as a wildcard.
    macro_rules! push_literal {
        ($text:expr) => {{
            let text = $text.to_string();
            pattern.push_str(&glob::Pattern::escape(&text));
            current.push_str(&text);
        }};
    }

    while let Some(ch) = chars.next() {
        match (&state, ch) {
            (State::Normal | State::InWord, ' ' | '\t' | '\n') => {
                if let State::InWord = state {
                    finish_word!();
                }
                state = State::Normal;
            }
            (State::Normal | State::InWord, '|') => {
                if let State::InWord = state {
                    finish_word!();
                }
                tokens.push(Token::Pipe);
                state = State::Normal;
            }
            (State::Normal | State::InWord, '&') => {
                if let State::InWord = state {
                    finish_word!();
                }
                tokens.push(Token::Background);
                state = State::Normal;
            }
            (State::Normal | State::InWord, '"') => state = State::InDoubleQuote,
            (State::Normal | State::InWord, '\'') => state = State::InSingleQuote,
            (State::Normal | State::InWord, '\\') => {
                push_literal!(chars.next().unwrap_or('\\'));
                state = State::InWord;
            }
            (State::Normal | State::InWord, '$') if chars.peek() == Some(&'?') => {
                chars.next();
                push_literal!(last_status);
                state = State::InWord;
            }
            (State::Normal | State::InWord, c) => {
                if matches!(c, '*' | '?' | '[') {
                    globbable = true;
                }
                current.push(c);
                pattern.push(c);
                state = State::InWord;
            }

            (State::InDoubleQuote, '"') => state = State::InWord,
            (State::InDoubleQuote, '\\') => match chars.peek() {
                Some('"' | '\\' | '$') => {
                    if let Some(escaped) = chars.next() {
                        push_literal!(escaped);
                    }
                }
                _ => push_literal!("\\"),
            },
            (State::InDoubleQuote, '$') if chars.peek() == Some(&'?') => {
                chars.next();
                push_literal!(last_status);
            }
            (State::InDoubleQuote, c) => push_literal!(c),

            (State::InSingleQuote, '\'') => state = State::InWord,
            (State::InSingleQuote, c) => push_literal!(c),
        }
    }

    match state {
        State::InDoubleQuote | State::InSingleQuote => {
            Err("syntax error: unterminated quote".to_string())
        }
        State::InWord => {
            finish_word!();
            Ok(tokens)
        }
        State::Normal => Ok(tokens),
    }
}

/// Expand a glob pattern; a pattern matching nothing leaves `literal`.
fn expand_glob(pattern: &str, literal: String) -> Vec<String> {
    let matches: Vec<String> = match glob::glob(pattern) {
        Ok(paths) => paths
            .filter_map(Result::ok)
            .map(|path| path.display().to_string())
            .collect(),
        Err(_) => Vec::new(),
    };

    if matches.is_empty() {
        vec![literal]
    } else {
        matches
    }
}
