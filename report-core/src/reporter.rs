use console::{style, Term};
use eyre::WrapErr;
use std::collections::HashMap;
use tokio::sync::broadcast;
use tracing::*;

use crate::{
    launch::{ItemId, LaunchInfo},
    local::{AttachmentRecord, ItemRecord, LogRecord, Message, Status},
};

/// Reporter trait. The trait is based on the "template method" pattern.
/// You can implement on_xxx methods to hook into a launch. This way is enough for most usecases.
/// If you need more control, you can override the "run" method.
#[async_trait::async_trait]
pub trait Reporter {
    async fn run(&mut self, mut rx: broadcast::Receiver<Message>) -> eyre::Result<()> {
        loop {
            match rx.recv().await {
                Ok(Message::LaunchStarted(info)) => self.on_launch_start(info).await?,
                Ok(Message::ItemStarted(item)) => self.on_item_start(item).await?,
                Ok(Message::Log(log)) => self.on_log(log).await?,
                Ok(Message::Attachment(attachment)) => self.on_attachment(attachment).await?,
                Ok(Message::ItemFinished(id, status)) => self.on_item_finish(id, status).await?,
                Ok(Message::LaunchFinished) => self.on_launch_finish().await?,
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("launch channel has been closed");
                    break;
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    debug!("launch channel lagged, {n} messages skipped");
                    continue;
                }
            }
        }

        Ok(())
    }

    /// Called when the launch starts.
    async fn on_launch_start(&mut self, _info: LaunchInfo) -> eyre::Result<()> {
        Ok(())
    }

    /// Called when a suite, story, test or step is created.
    async fn on_item_start(&mut self, _item: Box<ItemRecord>) -> eyre::Result<()> {
        Ok(())
    }

    async fn on_log(&mut self, _log: Box<LogRecord>) -> eyre::Result<()> {
        Ok(())
    }

    async fn on_attachment(&mut self, _attachment: Box<AttachmentRecord>) -> eyre::Result<()> {
        Ok(())
    }

    /// Called when an item is finished.
    async fn on_item_finish(&mut self, _id: ItemId, _status: Status) -> eyre::Result<()> {
        Ok(())
    }

    async fn on_launch_finish(&mut self) -> eyre::Result<()> {
        Ok(())
    }
}

pub struct NullReporter;

#[async_trait::async_trait]
impl Reporter for NullReporter {}

/// Prints the report tree as items finish.
pub struct ListReporter {
    terminal: Term,
    items: HashMap<ItemId, Entry>,
    capture_logs: bool,
}

struct Entry {
    name: String,
    depth: usize,
    notes: Vec<String>,
}

impl ListReporter {
    pub fn new(capture_logs: bool) -> ListReporter {
        ListReporter {
            terminal: Term::stdout(),
            items: HashMap::new(),
            capture_logs,
        }
    }

    fn note(&mut self, id: &ItemId, depth_offset: usize, line: String) -> eyre::Result<()> {
        let entry = self
            .items
            .get_mut(id)
            .ok_or_else(|| eyre::eyre!("item \"{id}\" not found in the buffer"))?;
        entry.notes.push(indent(entry.depth + depth_offset, &line));
        Ok(())
    }
}

#[async_trait::async_trait]
impl Reporter for ListReporter {
    async fn on_launch_start(&mut self, info: LaunchInfo) -> eyre::Result<()> {
        self.terminal.write_line(&format!(
            "{} [{}]",
            style(&info.name).bold(),
            info.project
        ))?;
        Ok(())
    }

    async fn on_item_start(&mut self, item: Box<ItemRecord>) -> eyre::Result<()> {
        let depth = match &item.parent {
            Some(parent) => self.items.get(parent).map_or(0, |entry| entry.depth + 1),
            None => 0,
        };
        self.items.insert(
            item.id.clone(),
            Entry {
                name: item.name.clone(),
                depth,
                notes: Vec::new(),
            },
        );
        Ok(())
    }

    async fn on_log(&mut self, log: Box<LogRecord>) -> eyre::Result<()> {
        if self.capture_logs {
            let line = format!("[{}] {}", log.level, log.message);
            self.note(&log.item, 1, line)?;
        }
        Ok(())
    }

    async fn on_attachment(&mut self, attachment: Box<AttachmentRecord>) -> eyre::Result<()> {
        if self.capture_logs {
            let a = &attachment.attachment;
            let line = format!(
                "+ {} ({}, {})",
                a.name,
                a.attachment_type,
                a.payload.describe()
            );
            self.note(&attachment.item, 1, line)?;
        }
        Ok(())
    }

    async fn on_item_finish(&mut self, id: ItemId, status: Status) -> eyre::Result<()> {
        let entry = self
            .items
            .get_mut(&id)
            .ok_or_else(|| eyre::eyre!("item \"{id}\" not found in the buffer"))?;

        self.terminal
            .write_line(&format_item(entry.depth, &entry.name, &status))?;
        for note in entry.notes.drain(..) {
            write(&self.terminal, note)?;
        }
        Ok(())
    }
}

fn indent(depth: usize, s: &str) -> String {
    format!("{}{s}", "  ".repeat(depth))
}

/// One line of the tree for a finished item.
pub fn format_item(depth: usize, name: &str, status: &Status) -> String {
    let line = match status {
        Status::Passed => format!("{} {name}", style("✓").green()),
        Status::Failed(message) => format!("{} {name}: {message}", style("✘").red()),
        Status::Finished => format!("{} {name}", style("•").cyan()),
    };
    indent(depth, &line)
}

fn write(term: &Term, s: impl AsRef<str>) -> eyre::Result<()> {
    let colored = style(s.as_ref()).dim();
    term.write_line(&format!("{colored}"))
        .wrap_err("failed to write character on terminal")
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        launch::{ItemType, Launch, Level, NewItem},
        local::LocalLaunch,
    };
    use test_case::test_case;

    #[test_case(0, Status::Passed => "✓ Login"; "passed")]
    #[test_case(1, Status::Failed("timeout".into()) => "  ✘ Login: timeout"; "failed")]
    #[test_case(2, Status::Finished => "    • Login"; "generic")]
    fn format_finished_item(depth: usize, status: Status) -> String {
        console::strip_ansi_codes(&format_item(depth, "Login", &status)).into_owned()
    }

    #[derive(Default)]
    struct Recorder {
        events: Vec<String>,
    }

    #[async_trait::async_trait]
    impl Reporter for Recorder {
        async fn on_launch_start(&mut self, info: LaunchInfo) -> eyre::Result<()> {
            self.events.push(format!("launch {}", info.name));
            Ok(())
        }

        async fn on_item_start(&mut self, item: Box<ItemRecord>) -> eyre::Result<()> {
            self.events.push(format!("start {}", item.name));
            Ok(())
        }

        async fn on_log(&mut self, log: Box<LogRecord>) -> eyre::Result<()> {
            self.events.push(format!("log {}", log.message));
            Ok(())
        }

        async fn on_item_finish(&mut self, id: ItemId, status: Status) -> eyre::Result<()> {
            self.events.push(format!("finish {id} {status:?}"));
            Ok(())
        }

        async fn on_launch_finish(&mut self) -> eyre::Result<()> {
            self.events.push("done".to_string());
            Ok(())
        }
    }

    fn play(launch: &LocalLaunch) -> eyre::Result<()> {
        launch.start_launch(&LaunchInfo {
            name: "nightly".into(),
            ..Default::default()
        })?;
        let suite = launch.create_report_item(&NewItem::new("Checkout", ItemType::Suite))?;
        let test = launch.create_report_item(
            &NewItem::new("Pay", ItemType::Test).parent(Some(suite.clone())),
        )?;
        launch.create_log(&test, "paying", Level::Info)?;
        launch.finish_item(&test)?;
        launch.finish_launch()?;
        Ok(())
    }

    #[tokio::test]
    async fn run_dispatches_every_event_until_close() -> eyre::Result<()> {
        let launch = LocalLaunch::new();
        let rx = launch.subscribe()?;
        play(&launch)?;

        let mut recorder = Recorder::default();
        recorder.run(rx).await?;
        assert_eq!(
            recorder.events,
            vec![
                "launch nightly",
                "start Checkout",
                "start Pay",
                "log paying",
                "finish 2 Finished",
                "done",
            ]
        );
        Ok(())
    }

    #[tokio::test]
    async fn list_and_null_reporters_consume_a_launch() -> eyre::Result<()> {
        let launch = LocalLaunch::new();
        let list_rx = launch.subscribe()?;
        let null_rx = launch.subscribe()?;
        play(&launch)?;

        let mut list = ListReporter::new(true);
        list.run(list_rx).await?;
        assert_eq!(list.items.len(), 2);
        assert_eq!(list.items[&ItemId::new("2")].depth, 1);
        assert!(list.items.values().all(|entry| entry.notes.is_empty()));

        NullReporter.run(null_rx).await?;
        Ok(())
    }
}
