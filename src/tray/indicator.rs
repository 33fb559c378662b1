//! StatusNotifierItem tray icon backed by ksni.

use super::presenter::TrayView;
use ksni::TrayMethods;
use ksni::menu::StandardItem;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;

pub const TRAY_ID: &str = "usb-link-speed-tray";

/// Errors from the tray binding.
#[derive(Debug, Error)]
pub enum TrayError {
    #[error(
        "failed to register tray indicator ({0}); a StatusNotifierItem host is required \
         (KDE, or GNOME with the AppIndicator extension)"
    )]
    Register(#[from] ksni::Error),
    #[error("tray service has stopped")]
    Closed,
}

/// The tray item. Owned by the ksni service once spawned.
#[derive(Debug)]
pub struct SpeedIndicator {
    view: TrayView,
    icon_name: String,
    quit: UnboundedSender<()>,
}

impl SpeedIndicator {
    /// `quit` receives one message when the user picks "Quit".
    pub fn new(icon_name: impl Into<String>, quit: UnboundedSender<()>) -> Self {
        Self {
            view: TrayView::idle(),
            icon_name: icon_name.into(),
            quit,
        }
    }

    fn request_quit(&mut self) {
        // Receiver gone means the loop is already exiting.
        let _ = self.quit.send(());
    }
}

impl ksni::Tray for SpeedIndicator {
    fn id(&self) -> String {
        TRAY_ID.to_string()
    }

    fn category(&self) -> ksni::Category {
        ksni::Category::Hardware
    }

    fn title(&self) -> String {
        self.view.title.clone()
    }

    fn icon_name(&self) -> String {
        self.icon_name.clone()
    }

    fn tool_tip(&self) -> ksni::ToolTip {
        ksni::ToolTip {
            icon_name: self.icon_name.clone(),
            title: "USB link speed".to_string(),
            description: self.view.tooltip.join("\n"),
            ..Default::default()
        }
    }

    fn menu(&self) -> Vec<ksni::MenuItem<Self>> {
        let mut items: Vec<ksni::MenuItem<Self>> = if self.view.is_idle() {
            vec![
                StandardItem {
                    label: super::presenter::IDLE_TEXT.to_string(),
                    enabled: false,
                    ..Default::default()
                }
                .into(),
            ]
        } else {
            self.view
                .rows
                .iter()
                .map(|row| {
                    StandardItem {
                        label: row.text.clone(),
                        enabled: false,
                        ..Default::default()
                    }
                    .into()
                })
                .collect()
        };

        items.push(ksni::MenuItem::Separator);
        items.push(
            StandardItem {
                label: "Quit".to_string(),
                icon_name: "application-exit".to_string(),
                activate: Box::new(|tray: &mut Self| tray.request_quit()),
                ..Default::default()
            }
            .into(),
        );
        items
    }
}

/// Handle to the running tray service. Created once at startup and passed
/// to whoever needs to update the tray.
pub struct TrayHandle {
    handle: ksni::Handle<SpeedIndicator>,
}

impl TrayHandle {
    /// Register the indicator on the session bus.
    pub async fn spawn(indicator: SpeedIndicator) -> Result<Self, TrayError> {
        let handle = indicator.spawn().await?;
        tracing::debug!("tray indicator registered as {}", TRAY_ID);
        Ok(Self { handle })
    }

    /// Replace the view shown by the tray.
    pub async fn show(&self, view: TrayView) -> Result<(), TrayError> {
        self.handle
            .update(move |indicator: &mut SpeedIndicator| indicator.view = view)
            .await
            .ok_or(TrayError::Closed)
    }

    /// Unregister the indicator and wait for the service to stop.
    pub async fn shutdown(self) {
        self.handle.shutdown().await;
    }
}
