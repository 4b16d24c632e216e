//! In-place terminal progress line

use super::Viewer;
use crate::tracker::{TrackerEvent, TrackerState};
use anyhow::Result;
use indicatif::{ProgressDrawTarget, ProgressStyle};

/// Renders a template such as `"{valid}/{total}"` from tracker counters and
/// redraws it in place on stderr.
///
/// Supported placeholders: `{valid}`, `{total}`, `{school}`, `{type}` and
/// `{mode}`. Anything else is copied through unchanged.
pub struct ProgressBar {
    template: String,
    hidden: bool,
    bar: Option<indicatif::ProgressBar>,
}

impl ProgressBar {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            hidden: false,
            bar: None,
        }
    }

    /// Same rendering, but never draws to the terminal.
    pub fn hidden(template: impl Into<String>) -> Self {
        Self {
            hidden: true,
            ..Self::new(template)
        }
    }

    /// Last message drawn, if the bar has been started.
    pub fn message(&self) -> Option<String> {
        self.bar.as_ref().map(|bar| bar.message())
    }

    pub fn render(&self, state: &TrackerState) -> String {
        let counts = state.pair_counts();
        let mut out = String::with_capacity(self.template.len());
        let mut rest = self.template.as_str();

        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let after = &rest[open..];
            let Some(close) = after.find('}') else {
                rest = after;
                break;
            };
            let key = &after[1..close];
            match key {
                "valid" => out.push_str(&counts.valid.to_string()),
                "total" => out.push_str(&counts.total.to_string()),
                "school" => out.push_str(state.school.as_deref().unwrap_or("")),
                "type" => out.push_str(state.data_type.map(|t| t.as_str()).unwrap_or("")),
                "mode" => out.push_str(&state.mode.to_string()),
                _ => out.push_str(&after[..=close]),
            }
            rest = &after[close + 1..];
        }
        out.push_str(rest);
        out
    }

    fn start(&mut self) -> Result<()> {
        let target = if self.hidden {
            ProgressDrawTarget::hidden()
        } else {
            ProgressDrawTarget::stderr()
        };
        let bar = indicatif::ProgressBar::with_draw_target(None, target);
        bar.set_style(ProgressStyle::with_template("{spinner:.green} {msg}")?);
        self.bar = Some(bar);
        Ok(())
    }

    fn redraw(&mut self, state: &TrackerState) -> Result<()> {
        if self.bar.is_none() {
            self.start()?;
        }
        let message = self.render(state);
        if let Some(bar) = &self.bar {
            bar.set_message(message);
            bar.tick();
        }
        Ok(())
    }
}

impl Viewer for ProgressBar {
    fn name(&self) -> &str {
        "progress"
    }

    fn receive(&mut self, state: &TrackerState, event: &TrackerEvent<'_>) -> Result<()> {
        match event {
            TrackerEvent::Started => self.start(),
            TrackerEvent::Ended => {
                if let Some(bar) = self.bar.take() {
                    bar.finish_and_clear();
                }
                Ok(())
            }
            TrackerEvent::Error(_) | TrackerEvent::ContextChanged => Ok(()),
            _ => self.redraw(state),
        }
    }

    fn suspend(&self, f: &mut dyn FnMut()) {
        match &self.bar {
            Some(bar) => bar.suspend(f),
            None => f(),
        }
    }
}
