use tracing::debug;

use crate::seek::{ProgressBar, SeekInput};

#[derive(Debug)]
pub enum ControlCommand {
    Seek(SeekInput),
    Quit,
}

/// Cloneable handle for sending pointer input and lifecycle commands to a
/// running player loop.
#[derive(Debug, Clone)]
pub struct Controls {
    tx: tokio::sync::mpsc::UnboundedSender<ControlCommand>,
}

impl Controls {
    pub fn new(tx: tokio::sync::mpsc::UnboundedSender<ControlCommand>) -> Self {
        Self { tx }
    }

    pub fn seek_click(&self, bar: ProgressBar, x: f64) {
        self.send(ControlCommand::Seek(SeekInput::Click { bar, x }));
    }

    pub fn seek_press(&self, bar: ProgressBar, x: f64) {
        self.send(ControlCommand::Seek(SeekInput::Press { bar, x }));
    }

    pub fn seek_move(&self, bar: ProgressBar, x: f64) {
        self.send(ControlCommand::Seek(SeekInput::Move { bar, x }));
    }

    pub fn seek_release(&self) {
        self.send(ControlCommand::Seek(SeekInput::Release));
    }

    pub fn quit(&self) {
        self.send(ControlCommand::Quit);
    }

    fn send(&self, command: ControlCommand) {
        if let Err(error) = self.tx.send(command) {
            debug!("player loop is gone, dropping {:?}", error.0);
        }
    }
}
