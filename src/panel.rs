//! The floating summary panel: fencing, drag handling and persisted state.

use crate::fence::{Position, Size, ViewportFence};
use crate::{PanelConfig, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Key the panel state is stored under.
pub const STATE_KEY: &str = "supercal_state";

/// Notifications from the host document the panel is mounted in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HostEvent {
    /// The window was resized.
    ViewportResized(Size),
    /// The panel's rendered size changed, e.g. after collapsing or a reflow.
    PanelResized(Size),
    /// A pointer was pressed on the drag handle.
    PointerDown(Position),
    /// The pointer moved.
    PointerMove(Position),
    /// The pointer was released.
    PointerUp,
    /// The host rewrote its DOM and the panel has to be mounted again.
    DomDisrupted,
}

/// A persistent string key-value store.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>>;

    fn set(&mut self, key: &str, value: String) -> Result<()>;
}

/// A `KeyValueStore` that lives in memory only.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: IndexMap<String, String>,
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: String) -> Result<()> {
        self.entries.insert(key.to_owned(), value);
        Ok(())
    }
}

/// A `KeyValueStore` backed by a JSON object in a file.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> JsonFileStore {
        JsonFileStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<IndexMap<String, String>> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(IndexMap::new()),
            Err(err) => Err(err.into()),
        }
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.read()?.remove(key))
    }

    fn set(&mut self, key: &str, value: String) -> Result<()> {
        let mut entries = self.read()?;
        entries.insert(key.to_owned(), value);

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        fs::write(&self.path, serde_json::to_string_pretty(&entries)?)?;
        Ok(())
    }
}

/// State of the panel persisted across sessions.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Default)]
pub struct PanelState {
    #[serde(default)]
    pub position: Option<Position>,
    #[serde(default)]
    pub collapsed: bool,
}

/// Controller for the floating panel.
pub struct Panel<S> {
    fence: ViewportFence,
    collapsed: bool,
    store: S,
}

impl<S: KeyValueStore> Panel<S> {
    /// Creates a panel from the state saved in `store`, falling back to the configured defaults.
    pub fn restore(store: S, config: &PanelConfig) -> Result<Panel<S>> {
        let state = match store.get(STATE_KEY)? {
            Some(raw) => serde_json::from_str(&raw).unwrap_or_else(|err| {
                log::warn!("ignoring malformed panel state: {err}");
                PanelState::default()
            }),
            None => PanelState::default(),
        };

        let initial = state.position.unwrap_or(config.initial_position);
        log::debug!(
            "restored panel at ({}, {}), collapsed: {}",
            initial.x,
            initial.y,
            state.collapsed
        );

        Ok(Panel {
            fence: ViewportFence::new(initial, config.padding),
            collapsed: state.collapsed,
            store,
        })
    }

    /// Handles a host notification. Returns the position the panel has to be rendered at, if it
    /// has to be rendered again.
    pub fn handle(&mut self, event: HostEvent) -> Result<Option<Position>> {
        let moved = match event {
            HostEvent::ViewportResized(size) => {
                let moved = self.fence.viewport_resized(size);
                self.persist_if_moved(moved)?
            }
            HostEvent::PanelResized(size) => {
                let moved = self.fence.panel_resized(size);
                self.persist_if_moved(moved)?
            }
            HostEvent::PointerDown(pointer) => {
                self.fence.begin_drag(pointer);
                None
            }
            // Persisted once the drag ends.
            HostEvent::PointerMove(pointer) => self.fence.drag_to(pointer),
            HostEvent::PointerUp => {
                if self.fence.end_drag().is_some() {
                    self.persist()?;
                }
                None
            }
            HostEvent::DomDisrupted => Some(self.fence.position()),
        };

        Ok(moved)
    }

    /// Flips the collapsed flag and persists it. Returns the new value.
    ///
    /// The host reports the resulting size change as `HostEvent::PanelResized`.
    pub fn toggle_collapsed(&mut self) -> Result<bool> {
        self.collapsed = !self.collapsed;
        self.persist()?;
        Ok(self.collapsed)
    }

    pub fn position(&self) -> Position {
        self.fence.position()
    }

    pub fn is_collapsed(&self) -> bool {
        self.collapsed
    }

    pub fn fence(&self) -> &ViewportFence {
        &self.fence
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn persist_if_moved(&mut self, moved: Option<Position>) -> Result<Option<Position>> {
        // Mid-drag positions are saved on release.
        if moved.is_some() && !self.fence.is_dragging() {
            self.persist()?;
        }

        Ok(moved)
    }

    fn persist(&mut self) -> Result<()> {
        let state = PanelState {
            position: Some(self.fence.position()),
            collapsed: self.collapsed,
        };

        self.store.set(STATE_KEY, serde_json::to_string(&state)?)
    }
}
