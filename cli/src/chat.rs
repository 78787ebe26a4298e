use anyhow::{Context, Result};
use log::warn;
use shared::{Episode, Paths, TranscriptionConfig};
use std::io::{BufRead, Write};
use std::process::{Command, Stdio};

/// Interactive question-and-answer loop over an episode transcript.
///
/// The first question pipes the transcript file into the model CLI as
/// context; follow-ups continue the model's last conversation with `-c`, so
/// the transcript is only uploaded once. Runs on the plain terminal, not
/// inside the alternate screen. Blocking on purpose: the user is typing.
pub fn run(config: &TranscriptionConfig, episode: &Episode, paths: &Paths) -> Result<()> {
    let transcript_path = paths.transcript_path(episode);
    anyhow::ensure!(
        transcript_path.exists(),
        "no transcript found for '{}'",
        episode.title
    );

    println!("Chatting about: {}", episode.title);
    println!("Ask about the transcript. Empty input or 'q' exits.");
    println!();

    let stdin = std::io::stdin();
    let mut first_question = true;

    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let mut question = String::new();
        if stdin.lock().read_line(&mut question)? == 0 {
            // Ctrl-D.
            println!();
            return Ok(());
        }
        let question = question.trim();
        if question.is_empty() || question.eq_ignore_ascii_case("q") {
            return Ok(());
        }

        let mut command = Command::new(&config.command);
        if first_question {
            let transcript = std::fs::File::open(&transcript_path)
                .with_context(|| format!("failed to open {}", transcript_path.display()))?;
            command
                .arg("-m")
                .arg(&config.model)
                .arg(question)
                .stdin(Stdio::from(transcript));
        } else {
            command.arg("-c").arg(question).stdin(Stdio::null());
        }

        // The model CLI streams its answer straight to the terminal.
        match command.status() {
            Ok(status) if status.success() => {
                first_question = false;
                println!();
            }
            Ok(status) => {
                warn!("chat command exited with {status}");
                println!("The model command failed ({status}); try again.");
            }
            Err(err) => {
                return Err(err).with_context(|| {
                    format!("failed to run '{}'; is it installed?", config.command)
                });
            }
        }
    }
}
