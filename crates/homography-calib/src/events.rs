//! Key map, command dispatch, event sources and view hosts.
//!
//! The loop pulls one [`Event`] at a time, maps keys to a [`Command`] and
//! runs the handler from [`handler_for`]. Handler errors become status
//! messages; only `Exit` or the end of the stream stops the loop.

use crate::core::{CornerDetector, RgbImage};
use crate::detect::rgb_to_image;
use crate::probe_session::ProbeSession;
use crate::session::{Session, SessionError, Status, StatusLevel, View};
use log::{debug, error, info, warn};
use std::fmt;
use std::io::{BufRead, Lines};
use std::path::{Path, PathBuf};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Key {
    Char(char),
    Escape,
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Char(c) => write!(f, "{c}"),
            Self::Escape => f.write_str("ESC"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Event {
    Click { view: View, x: f64, y: f64 },
    Key(Key),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Command {
    SavePair,
    PlanView,
    MergeView,
    AutoDetect,
    Rotate,
    Flip,
    Exit,
}

impl Command {
    pub fn describe(self) -> &'static str {
        match self {
            Self::SavePair => "Save current point pair",
            Self::PlanView => "Create plan view with homography",
            Self::MergeView => "Merge views",
            Self::AutoDetect => "Auto-detect chessboard corners",
            Self::Rotate => "Rotate destination image",
            Self::Flip => "Flip destination image",
            Self::Exit => "Exit",
        }
    }
}

/// Ordered key → command bindings.
#[derive(Clone, Debug)]
pub struct KeyMap {
    bindings: Vec<(Key, Command)>,
}

impl Default for KeyMap {
    fn default() -> Self {
        Self {
            bindings: vec![
                (Key::Char('s'), Command::SavePair),
                (Key::Char('h'), Command::PlanView),
                (Key::Char('m'), Command::MergeView),
                (Key::Char('c'), Command::AutoDetect),
                (Key::Char('r'), Command::Rotate),
                (Key::Char('f'), Command::Flip),
                (Key::Escape, Command::Exit),
                (Key::Char('q'), Command::Exit),
            ],
        }
    }
}

impl KeyMap {
    pub fn command_for(&self, key: Key) -> Option<Command> {
        self.bindings
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, c)| *c)
    }

    /// Operator help, one binding per line.
    pub fn controls(&self) -> String {
        let mut out = String::from("Controls:");
        for (key, command) in &self.bindings {
            out.push_str(&format!("\n  {key}: {}", command.describe()));
        }
        out
    }
}

pub type Handler<D> = fn(&mut Session<D>) -> Result<(), SessionError>;

/// Dispatch table. `Exit` has no handler; the loop ends instead.
pub fn handler_for<D: CornerDetector>(command: Command) -> Option<Handler<D>> {
    let handler: Handler<D> = match command {
        Command::SavePair => Session::<D>::save_pair,
        Command::PlanView => Session::<D>::show_plan_view,
        Command::MergeView => Session::<D>::show_merged_view,
        Command::AutoDetect => Session::<D>::auto_detect,
        Command::Rotate => Session::<D>::rotate,
        Command::Flip => Session::<D>::flip,
        Command::Exit => return None,
    };
    Some(handler)
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum EventParseError {
    #[error("unknown event `{0}`")]
    UnknownEvent(String),
    #[error("unknown view `{0}` (expected src or dst)")]
    UnknownView(String),
    #[error("bad coordinate `{0}`")]
    BadNumber(String),
    #[error("bad key `{0}`")]
    BadKey(String),
    #[error("expected `click src|dst X Y` or `key K`, got `{0}`")]
    Malformed(String),
}

/// Parse one script line. Blank lines and `#` comments yield `None`.
pub fn parse_event(line: &str) -> Result<Option<Event>, EventParseError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let number = |s: &str| {
        s.parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| EventParseError::BadNumber(s.to_string()))
    };

    match tokens.as_slice() {
        ["click", view, x, y] => {
            let view = match *view {
                "src" | "source" => View::Source,
                "dst" | "destination" => View::Destination,
                other => return Err(EventParseError::UnknownView(other.to_string())),
            };
            Ok(Some(Event::Click {
                view,
                x: number(*x)?,
                y: number(*y)?,
            }))
        }
        ["key", key] => {
            if key.eq_ignore_ascii_case("esc") || key.eq_ignore_ascii_case("escape") {
                return Ok(Some(Event::Key(Key::Escape)));
            }
            let mut chars = key.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Ok(Some(Event::Key(Key::Char(c)))),
                _ => Err(EventParseError::BadKey(key.to_string())),
            }
        }
        ["click", ..] | ["key", ..] => Err(EventParseError::Malformed(line.to_string())),
        [other, ..] => Err(EventParseError::UnknownEvent(other.to_string())),
        [] => Ok(None),
    }
}

/// The only suspension point of the loop.
pub trait EventSource {
    fn next_event(&mut self) -> Option<Event>;
}

/// Events read line by line from a script file or stdin.
pub struct ScriptEventSource<R> {
    lines: Lines<R>,
    line_no: usize,
}

impl<R: BufRead> ScriptEventSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line_no: 0,
        }
    }
}

impl<R: BufRead> EventSource for ScriptEventSource<R> {
    fn next_event(&mut self) -> Option<Event> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(err) => {
                    error!("event stream: {err}");
                    return None;
                }
            };
            self.line_no += 1;
            match parse_event(&line) {
                Ok(Some(event)) => return Some(event),
                Ok(None) => {}
                Err(err) => warn!("line {}: {err}", self.line_no),
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ViewName {
    Source,
    Destination,
    PlanView,
    MergedView,
}

impl ViewName {
    pub fn file_name(self) -> &'static str {
        match self {
            Self::Source => "src.png",
            Self::Destination => "dst.png",
            Self::PlanView => "plan_view.png",
            Self::MergedView => "merged_view.png",
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum HostError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Image(#[from] image::ImageError),
    #[error("cannot encode a {width}x{height} image")]
    Buffer { width: usize, height: usize },
}

/// Where views and status messages go.
pub trait ViewHost {
    fn show(&mut self, view: ViewName, image: &RgbImage) -> Result<(), HostError>;
    fn status(&mut self, status: &Status);
    fn close_all(&mut self) -> Result<(), HostError> {
        Ok(())
    }
}

/// Writes every shown view as a PNG into one directory and prints status
/// messages to stdout.
pub struct PngDirHost {
    dir: PathBuf,
    written: Vec<PathBuf>,
}

impl PngDirHost {
    pub fn new(dir: impl AsRef<Path>) -> Result<Self, HostError> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            written: Vec::new(),
        })
    }

    /// Distinct files written so far.
    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }
}

impl ViewHost for PngDirHost {
    fn show(&mut self, view: ViewName, image: &RgbImage) -> Result<(), HostError> {
        let encoded = rgb_to_image(image).ok_or(HostError::Buffer {
            width: image.width,
            height: image.height,
        })?;
        let path = self.dir.join(view.file_name());
        encoded.save(&path)?;
        debug!("wrote {}", path.display());
        if !self.written.contains(&path) {
            self.written.push(path);
        }
        Ok(())
    }

    fn status(&mut self, status: &Status) {
        match status.level {
            StatusLevel::Info => println!("{}", status.message),
            StatusLevel::Warning => println!("warning: {}", status.message),
            StatusLevel::Error => println!("error: {}", status.message),
        }
    }

    fn close_all(&mut self) -> Result<(), HostError> {
        info!("{} views in {}", self.written.len(), self.dir.display());
        Ok(())
    }
}

fn present<D: CornerDetector, H: ViewHost + ?Sized>(
    session: &Session<D>,
    host: &mut H,
    command: Command,
) -> Result<(), HostError> {
    let (name, image) = match command {
        Command::PlanView => (ViewName::PlanView, session.plan_view()),
        Command::MergeView => (ViewName::MergedView, session.merged_view()),
        _ => return Ok(()),
    };
    match image {
        Some(image) => host.show(name, image),
        None => Ok(()),
    }
}

/// Drive a calibration session until `Exit` or end of input, then hand the
/// final working copies to the host.
pub fn run<D, S, H>(
    session: &mut Session<D>,
    events: &mut S,
    host: &mut H,
    keymap: &KeyMap,
) -> Result<(), HostError>
where
    D: CornerDetector,
    S: EventSource + ?Sized,
    H: ViewHost + ?Sized,
{
    while let Some(event) = events.next_event() {
        let command = match event {
            Event::Click { view, x, y } => {
                session.click(view, x, y);
                None
            }
            Event::Key(key) => {
                let command = keymap.command_for(key);
                if command.is_none() {
                    debug!("unbound key {key}");
                }
                command
            }
        };

        if command == Some(Command::Exit) {
            break;
        }
        if let Some(command) = command {
            if let Some(handler) = handler_for::<D>(command) {
                match handler(session) {
                    Ok(()) => present(session, host, command)?,
                    Err(err) => session.report(&err),
                }
            }
        }
        for status in session.drain_status() {
            host.status(&status);
        }
    }

    for status in session.drain_status() {
        host.status(&status);
    }
    host.show(ViewName::Source, session.source().working())?;
    host.show(ViewName::Destination, session.destination().working())?;
    host.close_all()
}

/// Drive a probe session: source clicks probe one point, the auto-detect
/// key probes every detected corner.
pub fn run_probe<D, S, H>(
    session: &mut ProbeSession<D>,
    events: &mut S,
    host: &mut H,
    keymap: &KeyMap,
) -> Result<(), HostError>
where
    D: CornerDetector,
    S: EventSource + ?Sized,
    H: ViewHost + ?Sized,
{
    while let Some(event) = events.next_event() {
        let outcome = match event {
            Event::Click {
                view: View::Source,
                x,
                y,
            } => session.probe_at(x, y).map(|_| ()),
            Event::Click { .. } => Ok(()),
            Event::Key(key) => match keymap.command_for(key) {
                Some(Command::Exit) => break,
                Some(Command::AutoDetect) => session.probe_detected().map(|_| ()),
                other => {
                    debug!("{other:?} is not available while probing");
                    Ok(())
                }
            },
        };
        if let Err(err) = outcome {
            session.report(&err);
        }
        for status in session.drain_status() {
            host.status(&status);
        }
    }

    for status in session.drain_status() {
        host.status(&status);
    }
    host.show(ViewName::Source, session.source().working())?;
    host.show(ViewName::Destination, session.destination().working())?;
    host.close_all()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_clicks_and_keys() {
        assert_eq!(
            parse_event("click src 10 20.5").expect("valid"),
            Some(Event::Click {
                view: View::Source,
                x: 10.0,
                y: 20.5
            })
        );
        assert_eq!(
            parse_event("  click dst 1 2 ").expect("valid"),
            Some(Event::Click {
                view: View::Destination,
                x: 1.0,
                y: 2.0
            })
        );
        assert_eq!(
            parse_event("key s").expect("valid"),
            Some(Event::Key(Key::Char('s')))
        );
        assert_eq!(
            parse_event("key ESC").expect("valid"),
            Some(Event::Key(Key::Escape))
        );
    }

    #[test]
    fn comments_and_blank_lines_are_skipped() {
        assert_eq!(parse_event("").expect("valid"), None);
        assert_eq!(parse_event("   # rotate twice").expect("valid"), None);
    }

    #[test]
    fn malformed_lines_are_errors() {
        assert_eq!(
            parse_event("click left 1 2"),
            Err(EventParseError::UnknownView("left".into()))
        );
        assert_eq!(
            parse_event("click src one 2"),
            Err(EventParseError::BadNumber("one".into()))
        );
        assert_eq!(
            parse_event("key ctrl"),
            Err(EventParseError::BadKey("ctrl".into()))
        );
        assert!(matches!(
            parse_event("click src 1"),
            Err(EventParseError::Malformed(_))
        ));
        assert!(matches!(
            parse_event("wave"),
            Err(EventParseError::UnknownEvent(_))
        ));
    }

    #[test]
    fn script_source_skips_bad_lines() {
        let script = "# header\nclick src 1 2\nbogus line\n\nkey h\n";
        let mut source = ScriptEventSource::new(script.as_bytes());
        assert!(matches!(
            source.next_event(),
            Some(Event::Click {
                view: View::Source,
                ..
            })
        ));
        assert_eq!(source.next_event(), Some(Event::Key(Key::Char('h'))));
        assert_eq!(source.next_event(), None);
    }

    #[test]
    fn default_keymap_matches_the_controls() {
        let keys = KeyMap::default();
        assert_eq!(keys.command_for(Key::Char('s')), Some(Command::SavePair));
        assert_eq!(keys.command_for(Key::Char('h')), Some(Command::PlanView));
        assert_eq!(keys.command_for(Key::Char('m')), Some(Command::MergeView));
        assert_eq!(keys.command_for(Key::Char('c')), Some(Command::AutoDetect));
        assert_eq!(keys.command_for(Key::Char('r')), Some(Command::Rotate));
        assert_eq!(keys.command_for(Key::Char('f')), Some(Command::Flip));
        assert_eq!(keys.command_for(Key::Escape), Some(Command::Exit));
        assert_eq!(keys.command_for(Key::Char('x')), None);

        let help = keys.controls();
        assert!(help.starts_with("Controls:\n  s: Save current point pair"));
        assert!(help.contains("\n  ESC: Exit"));
    }

    #[test]
    fn only_exit_lacks_a_handler() {
        struct NoDetector;
        impl CornerDetector for NoDetector {
            fn detect(
                &self,
                _image: &crate::core::GrayImageView<'_>,
                rows: u32,
                cols: u32,
            ) -> Result<Vec<nalgebra::Point2<f32>>, crate::core::DetectionFailure> {
                Err(crate::core::DetectionFailure::NoGrid { rows, cols })
            }
        }
        assert!(handler_for::<NoDetector>(Command::Exit).is_none());
        assert!(handler_for::<NoDetector>(Command::Flip).is_some());
    }
}
