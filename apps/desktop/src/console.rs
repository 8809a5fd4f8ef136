//! Operator-facing terminal surface: line commands in, rendered updates out.

use client_core::{NoticeKind, SessionCommand, SessionUpdate};
use shared::domain::HeadsetId;

pub const HELP: &str = "\
commands:
  connect            connect to the device service
  select <id>        use a discovered headset
  start <seconds>    start a recording
  restart            ask the service to cancel any running recording
  new                back to the ready screen
  rescan             search for headsets again
  disconnect         drop the session
  help               show this text
  quit               disconnect and exit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatorInput {
    Session(SessionCommand),
    Help,
    Quit,
}

pub fn parse_line(line: &str) -> Result<Option<OperatorInput>, String> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };
    let argument = words.next();

    let input = match (verb.to_ascii_lowercase().as_str(), argument) {
        ("connect", None) => OperatorInput::Session(SessionCommand::Connect),
        ("select", Some(id)) => {
            OperatorInput::Session(SessionCommand::SelectHeadset(HeadsetId::new(id)))
        }
        ("select", None) => return Err("usage: select <headset id>".into()),
        ("start", Some(raw)) => {
            let seconds = raw
                .parse::<i64>()
                .map_err(|_| format!("'{raw}' is not a whole number of seconds"))?;
            OperatorInput::Session(SessionCommand::StartRecording(seconds))
        }
        ("start", None) => return Err("usage: start <seconds>".into()),
        ("restart", None) => OperatorInput::Session(SessionCommand::RestartRecording),
        ("new", None) => OperatorInput::Session(SessionCommand::NewRecording),
        ("rescan", None) => OperatorInput::Session(SessionCommand::Rescan),
        ("disconnect", None) => OperatorInput::Session(SessionCommand::Disconnect),
        ("help" | "?", _) => OperatorInput::Help,
        ("quit" | "exit", None) => OperatorInput::Quit,
        (other, _) => return Err(format!("unknown command '{other}', try 'help'")),
    };
    Ok(Some(input))
}

/// One line per update; `None` for updates the terminal does not show.
pub fn render(update: &SessionUpdate) -> Option<String> {
    let line = match update {
        SessionUpdate::StateChanged { to, .. } => format!("[{to}]"),
        SessionUpdate::HeadsetsFound(headsets) => {
            let mut lines = vec!["headsets:".to_string()];
            lines.extend(
                headsets
                    .iter()
                    .map(|headset| format!("  {}  {}", headset.id, headset.label())),
            );
            lines.join("\n")
        }
        SessionUpdate::NoHeadsetsFound => return None,
        SessionUpdate::Countdown { display, .. } => format!("time left {display}"),
        SessionUpdate::Score(score) => format!("score {score:.0}"),
        SessionUpdate::Results(summary) => {
            format!("average score {:.0}", summary.average_score)
        }
        SessionUpdate::Notice { kind, message } => match kind {
            NoticeKind::Info => message.clone(),
            NoticeKind::Rejected => format!("not now: {message}"),
            NoticeKind::Error => format!("error: {message}"),
        },
    };
    Some(line)
}
