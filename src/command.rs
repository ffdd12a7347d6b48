// SPDX-License-Identifier: GPL-3.0-only
//! Running external tools
//!
//! All collaborators (xrandr, setxkbmap, udisksctl, notify-send, ...) are
//! plain programs. Calls block until the program exits.

use std::process::{Command, Stdio};

use crate::error::CommandError;

/// Run `program` with `args`, failing on a non-zero exit status
pub fn run<S: AsRef<str>>(program: &str, args: &[S]) -> Result<(), CommandError> {
    let line = render(program, args);
    info!("{}", line);

    let status = Command::new(program)
        .args(args.iter().map(AsRef::as_ref))
        .stdin(Stdio::null())
        .status()
        .map_err(|source| CommandError::Spawn {
            program: program.to_string(),
            source,
        })?;

    if status.success() {
        Ok(())
    } else {
        Err(CommandError::Status { command: line, status })
    }
}

/// Run `program` and capture its standard output
pub fn output<S: AsRef<str>>(program: &str, args: &[S]) -> Result<Vec<u8>, CommandError> {
    let output = Command::new(program)
        .args(args.iter().map(AsRef::as_ref))
        .stdin(Stdio::null())
        .stderr(Stdio::inherit())
        .output()
        .map_err(|source| CommandError::Spawn {
            program: program.to_string(),
            source,
        })?;

    if output.status.success() {
        Ok(output.stdout)
    } else {
        Err(CommandError::Status {
            command: render(program, args),
            status: output.status,
        })
    }
}

/// Run `first | second`, failing if either side fails
pub fn pipe<S: AsRef<str>, T: AsRef<str>>(
    first: &str,
    first_args: &[S],
    second: &str,
    second_args: &[T],
) -> Result<(), CommandError> {
    let first_line = render(first, first_args);
    let second_line = render(second, second_args);
    info!("{} | {}", first_line, second_line);

    let spawn_error = |program: &str| {
        let program = program.to_string();
        move |source: std::io::Error| CommandError::Spawn { program, source }
    };

    let mut producer = Command::new(first)
        .args(first_args.iter().map(AsRef::as_ref))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .spawn()
        .map_err(spawn_error(first))?;

    let consumer_status = match producer.stdout.take() {
        Some(stdout) => Command::new(second)
            .args(second_args.iter().map(AsRef::as_ref))
            .stdin(stdout)
            .status()
            .map_err(spawn_error(second)),
        None => Err(CommandError::Spawn {
            program: first.to_string(),
            source: std::io::Error::other("stdout was not captured"),
        }),
    };

    let producer_status = producer.wait().map_err(spawn_error(first))?;
    let consumer_status = consumer_status?;

    if !producer_status.success() {
        return Err(CommandError::Status {
            command: first_line,
            status: producer_status,
        });
    }
    if !consumer_status.success() {
        return Err(CommandError::Status {
            command: second_line,
            status: consumer_status,
        });
    }
    Ok(())
}

/// Shell-like rendering of a command line, for logs
pub fn render<S: AsRef<str>>(program: &str, args: &[S]) -> String {
    std::iter::once(program)
        .chain(args.iter().map(AsRef::as_ref))
        .map(quote)
        .collect::<Vec<_>>()
        .join(" ")
}

fn quote(arg: &str) -> String {
    let plain = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=+,@%".contains(c));
    if plain {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_quotes_only_when_needed() {
        let line = render("setxkbmap", &["-option", "", "-layout", "us,ru", "it's"]);
        assert_eq!(line, r"setxkbmap -option '' -layout us,ru 'it'\''s'");
    }

    #[test]
    fn test_missing_program_is_spawn_error() {
        let err = run("/nonexistent/hotplug-brain-tool", &["x"]).unwrap_err();
        assert!(matches!(err, CommandError::Spawn { .. }));
    }
}
