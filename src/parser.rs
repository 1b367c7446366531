//! Line tokenizer + pipeline builder (`SPEC_FULL.md` §6): the concrete
//! realization of the pipeline input contract that `spec.md` leaves to an
//! external parser. Quoting/escaping is the only "language" here — no
//! variable interpolation, no globbing, no `;`/`&&`/`||` chaining.

use crate::command::{Command, Pipeline, Stage};

/// States for the tokenizer state machine.
enum State {
    Normal,
    InWord,
    InDoubleQuote,
    InSingleQuote,
}

/// Tokenize a line into words, honoring double quotes, single quotes, and
/// backslash escapes. `|`, `<`, `>` are still plain characters here —
/// operator recognition happens per-token in [`parse_line`], same as the
/// original shell treats them as separate argv entries.
pub fn tokenize(input: &str) -> Vec<String> {
    let mut tokens: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut state = State::Normal;
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        match (&state, ch) {
            (State::Normal, ' ' | '\t') => {}
            (State::Normal, '"') => state = State::InDoubleQuote,
            (State::Normal, '\'') => state = State::InSingleQuote,
            (State::Normal, '\\') => {
                if let Some(next) = chars.next() {
                    current.push(next);
                }
                state = State::InWord;
            }
            (State::Normal, c) => {
                current.push(c);
                state = State::InWord;
            }

            (State::InWord, ' ' | '\t') => {
                tokens.push(std::mem::take(&mut current));
                state = State::Normal;
            }
            (State::InWord, '"') => state = State::InDoubleQuote,
            (State::InWord, '\'') => state = State::InSingleQuote,
            (State::InWord, '\\') => {
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            (State::InWord, c) => current.push(c),

            (State::InDoubleQuote, '"') => state = State::InWord,
            (State::InDoubleQuote, '\\') => match chars.peek() {
                Some(&'"' | &'\\' | &'$' | &'`') => current.push(chars.next().unwrap()),
                _ => current.push('\\'),
            },
            (State::InDoubleQuote, c) => current.push(c),

            (State::InSingleQuote, '\'') => state = State::InWord,
            (State::InSingleQuote, c) => current.push(c),
        }
    }

    if !current.is_empty() {
        tokens.push(current);
    }

    tokens
}

/// Parse one input line into a [`Pipeline`]. Returns `Pipeline::empty()` for
/// blank input. Unresolvable stages (bad `export`/`kill` arity) become a
/// diagnostic-and-`None` from the caller's point of view — reported via
/// `Err(String)` so the REPL can print it and skip the line without
/// producing a bogus pipeline.
pub fn parse_line(input: &str) -> Result<Pipeline, String> {
    let trimmed = input.trim_end_matches(['\n', '\r']);
    let background = trimmed.trim_end().ends_with('&') && !ends_in_quoted_ampersand(trimmed);
    let body = if background {
        trimmed.trim_end().trim_end_matches('&').trim_end()
    } else {
        trimmed
    };

    if body.trim().is_empty() {
        return Ok(Pipeline::empty());
    }

    let mut stages = Vec::new();
    for (i, segment) in body.split('|').enumerate() {
        let mut stage = parse_stage(segment)?;
        if i > 0 {
            stage.flags.pipe_in = true;
        }
        stages.push(stage);
    }

    let pipe_count = stages.len();
    for (i, stage) in stages.iter_mut().enumerate() {
        if i + 1 < pipe_count {
            stage.flags.pipe_out = true;
        }
    }
    if let Some(first) = stages.first_mut() {
        first.flags.background = background;
    }

    stages.push(Stage::end());
    Ok(Pipeline { stages })
}

/// Heuristic guard against treating a trailing `&` inside quotes as the
/// background marker; good enough since quoting is not this module's
/// primary concern (`spec.md` §1 leaves quoting to "the parser").
fn ends_in_quoted_ampersand(line: &str) -> bool {
    let mut in_single = false;
    let mut in_double = false;
    for ch in line.chars() {
        match ch {
            '\'' if !in_double => in_single = !in_single,
            '"' if !in_single => in_double = !in_double,
            _ => {}
        }
    }
    in_single || in_double
}

fn parse_stage(segment: &str) -> Result<Stage, String> {
    let mut redirect_in = None;
    let mut redirect_out = None;
    let mut append = false;
    let mut words = Vec::new();

    let tokens = tokenize(segment);
    let mut iter = tokens.into_iter().peekable();
    while let Some(tok) = iter.next() {
        if let Some(path) = tok.strip_prefix(">>") {
            redirect_out = Some(take_path(path, &mut iter)?);
            append = true;
        } else if let Some(path) = tok.strip_prefix('>') {
            redirect_out = Some(take_path(path, &mut iter)?);
            append = false;
        } else if let Some(path) = tok.strip_prefix('<') {
            redirect_in = Some(take_path(path, &mut iter)?);
        } else {
            words.push(tok);
        }
    }

    if words.is_empty() {
        return Err("quill: empty command".to_string());
    }

    let command = build_command(words)?;
    let mut stage = Stage::new(command);
    stage.redirect_in = redirect_in;
    stage.redirect_out = redirect_out;
    stage.append = append;
    Ok(stage)
}

/// `<`/`>`/`>>` may or may not have whitespace before their target
/// (`>file` and `> file` both valid); pull the next token if the operator
/// token was bare.
fn take_path(rest: &str, iter: &mut std::iter::Peekable<std::vec::IntoIter<String>>) -> Result<String, String> {
    if !rest.is_empty() {
        return Ok(rest.to_string());
    }
    iter.next().ok_or_else(|| "quill: missing redirection target".to_string())
}

fn build_command(mut words: Vec<String>) -> Result<Command, String> {
    match words[0].as_str() {
        "echo" => Ok(Command::Echo(words)),
        "pwd" => Ok(Command::Pwd),
        "jobs" => Ok(Command::Jobs),
        "export" => {
            if words.len() != 3 {
                return Err("usage: export VAR VALUE".to_string());
            }
            let value = words.pop().unwrap();
            let name = words.pop().unwrap();
            Ok(Command::Export(name, value))
        }
        "cd" => match words.len() {
            1 => Ok(Command::Cd(None)),
            2 => Ok(Command::Cd(Some(words.pop().unwrap()))),
            _ => Err("usage: cd [dir]".to_string()),
        },
        "kill" => {
            if words.len() != 3 {
                return Err("usage: kill SIGNAL JOB".to_string());
            }
            let job: usize = words[2].parse().map_err(|_| "kill: bad job id".to_string())?;
            let sig: i32 = words[1].parse().map_err(|_| "kill: bad signal".to_string())?;
            Ok(Command::Kill(sig, job))
        }
        "exit" => match words.len() {
            1 => Ok(Command::Exit(None)),
            2 => {
                let code: i32 = words[1].parse().map_err(|_| "exit: bad status code".to_string())?;
                Ok(Command::Exit(Some(code)))
            }
            _ => Err("usage: exit [code]".to_string()),
        },
        _ => Ok(Command::External(words)),
    }
}

/// Render a pipeline back to the single-line text job notices use
/// (`spec.md` §6): argv space-joined per stage, redirections as
/// `<file`/`>file`/`>>file`, stages `|`-joined, trailing `&` iff
/// background.
pub fn render(pipeline: &Pipeline) -> String {
    let mut parts: Vec<String> = Vec::new();
    for stage in pipeline.real_stages() {
        let mut words = stage_words(&stage.command);
        if let Some(path) = &stage.redirect_in {
            words.push(format!("<{path}"));
        }
        if let Some(path) = &stage.redirect_out {
            let op = if stage.append { ">>" } else { ">" };
            words.push(format!("{op}{path}"));
        }
        parts.push(words.join(" "));
    }
    let mut rendered = parts.join(" | ");
    if pipeline.background() {
        rendered.push_str(" &");
    }
    rendered
}

fn stage_words(command: &Command) -> Vec<String> {
    match command {
        Command::External(argv) | Command::Echo(argv) => argv.clone(),
        Command::Export(name, value) => vec!["export".into(), name.clone(), value.clone()],
        Command::Cd(Some(path)) => vec!["cd".into(), path.clone()],
        Command::Cd(None) => vec!["cd".into()],
        Command::Kill(sig, job) => vec!["kill".into(), sig.to_string(), job.to_string()],
        Command::Pwd => vec!["pwd".into()],
        Command::Jobs => vec!["jobs".into()],
        Command::Exit(Some(code)) => vec!["exit".into(), code.to_string()],
        Command::Exit(None) => vec!["exit".into()],
        Command::End => vec![],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_external_command() {
        let p = parse_line("ls -la").unwrap();
        let stages: Vec<_> = p.real_stages().collect();
        assert_eq!(stages.len(), 1);
        assert_eq!(stages[0].command, Command::External(vec!["ls".into(), "-la".into()]));
    }

    #[test]
    fn double_quotes_preserve_spaces() {
        let p = parse_line(r#"echo "hello   world""#).unwrap();
        let stages: Vec<_> = p.real_stages().collect();
        assert_eq!(stages[0].command, Command::Echo(vec!["echo".into(), "hello   world".into()]));
    }

    #[test]
    fn pipe_sets_flags_on_both_sides() {
        let p = parse_line("echo foo | cat").unwrap();
        let stages: Vec<_> = p.real_stages().collect();
        assert_eq!(stages.len(), 2);
        assert!(stages[0].flags.pipe_out);
        assert!(!stages[0].flags.pipe_in);
        assert!(stages[1].flags.pipe_in);
        assert!(!stages[1].flags.pipe_out);
    }

    #[test]
    fn redirection_out_and_append() {
        let p = parse_line("echo bar > /tmp/out.txt").unwrap();
        let stages: Vec<_> = p.real_stages().collect();
        assert_eq!(stages[0].redirect_out.as_deref(), Some("/tmp/out.txt"));
        assert!(!stages[0].append);

        let p = parse_line("echo bar >> /tmp/out.txt").unwrap();
        let stages: Vec<_> = p.real_stages().collect();
        assert!(stages[0].append);
    }

    #[test]
    fn trailing_ampersand_marks_background() {
        let p = parse_line("sleep 1 &").unwrap();
        assert!(p.background());
        let stages: Vec<_> = p.real_stages().collect();
        assert_eq!(stages[0].command, Command::External(vec!["sleep".into(), "1".into()]));
    }

    #[test]
    fn export_requires_exactly_two_args() {
        assert!(parse_line("export FOO bar").is_ok());
        assert!(parse_line("export FOO").is_err());
    }

    #[test]
    fn kill_parses_numeric_signal_and_job() {
        let p = parse_line("kill 9 1").unwrap();
        let stages: Vec<_> = p.real_stages().collect();
        assert_eq!(stages[0].command, Command::Kill(9, 1));
    }

    #[test]
    fn blank_line_is_empty_pipeline() {
        assert!(parse_line("").unwrap().is_empty());
        assert!(parse_line("   ").unwrap().is_empty());
    }

    #[test]
    fn render_round_trips_redirection_and_background() {
        let p = parse_line("echo hi > /tmp/x &").unwrap();
        assert_eq!(render(&p), "echo hi >/tmp/x &");
    }

    #[test]
    fn render_joins_pipeline_stages_with_pipe() {
        let p = parse_line("echo foo | cat").unwrap();
        assert_eq!(render(&p), "echo foo | cat");
    }
}
