//! Log point actor - owns the enabled set and processes commands.
//!
//! Response and broadcast send failures are ignored: the caller or
//! subscriber has gone away.

use rxscope_core::{LogPoint, Recommendations};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info};

use super::commands::{LogPointCommand, LogPointsChanged};
use super::manager::LogPointManager;

/// The log point actor.
///
/// Processes commands and recommendation refreshes sequentially in one
/// task. A [`LogPointsChanged`] is published before the command is
/// answered, so a caller that subscribed earlier sees it first.
pub struct LogPointActor {
    receiver: mpsc::Receiver<LogPointCommand>,
    feed: Option<mpsc::Receiver<Recommendations>>,
    manager: LogPointManager,
    event_publisher: broadcast::Sender<LogPointsChanged>,
}

impl LogPointActor {
    /// Creates a new actor.
    ///
    /// # Arguments
    ///
    /// * `receiver` - Channel for receiving commands
    /// * `feed` - Optional recommendation feed
    /// * `event_publisher` - Broadcast channel for change notifications
    pub fn new(
        receiver: mpsc::Receiver<LogPointCommand>,
        feed: Option<mpsc::Receiver<Recommendations>>,
        event_publisher: broadcast::Sender<LogPointsChanged>,
    ) -> Self {
        Self {
            receiver,
            feed,
            manager: LogPointManager::new(),
            event_publisher,
        }
    }

    /// Runs until every command sender is dropped.
    pub async fn run(mut self) {
        info!(feed = self.feed.is_some(), "Log point actor starting");

        loop {
            tokio::select! {
                cmd = self.receiver.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd),
                    None => break,
                },
                recommendations = next_recommendations(&mut self.feed) => match recommendations {
                    Some(recommendations) => {
                        self.handle_refresh(recommendations);
                    }
                    None => {
                        debug!("Recommendation feed closed");
                        self.feed = None;
                    }
                },
            }
        }

        info!(enabled = self.manager.len(), "Log point actor stopped");
    }

    fn handle_command(&mut self, cmd: LogPointCommand) {
        match cmd {
            LogPointCommand::Enable {
                log_point,
                respond_to,
            } => {
                let changed = self.manager.enable(log_point);
                if changed {
                    self.publish();
                }
                let _ = respond_to.send(changed);
            }
            LogPointCommand::Disable {
                identifier,
                respond_to,
            } => {
                let changed = self.manager.disable(&identifier);
                if changed {
                    self.publish();
                }
                let _ = respond_to.send(changed);
            }
            LogPointCommand::Toggle {
                log_point,
                respond_to,
            } => {
                let enabled = self.manager.toggle(log_point);
                self.publish();
                let _ = respond_to.send(enabled);
            }
            LogPointCommand::GetLogPoints { respond_to } => {
                let _ = respond_to.send(self.manager.log_points());
            }
            LogPointCommand::GetForIdentifier {
                identifier,
                respond_to,
            } => {
                let _ = respond_to.send(self.manager.log_point_for_identifier(&identifier));
            }
            LogPointCommand::GetForSelection {
                file,
                range,
                respond_to,
            } => {
                let _ = respond_to.send(self.manager.log_points_for_selection(&file, range));
            }
            LogPointCommand::Refresh {
                recommendations,
                respond_to,
            } => {
                let kept = self.handle_refresh(recommendations);
                let _ = respond_to.send(kept);
            }
        }
    }

    fn handle_refresh(&mut self, recommendations: Recommendations) -> Vec<LogPoint> {
        let kept = self.manager.refresh(recommendations);
        self.publish();
        kept
    }

    fn publish(&self) {
        // No subscribers is fine.
        let _ = self.event_publisher.send(LogPointsChanged {
            log_points: self.manager.log_points(),
        });
    }
}

async fn next_recommendations(
    feed: &mut Option<mpsc::Receiver<Recommendations>>,
) -> Option<Recommendations> {
    match feed {
        Some(feed) => feed.recv().await,
        None => std::future::pending().await,
    }
}
