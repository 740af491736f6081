//! Persistence Collaborators
//!
//! The bridge persists three things: the configuration block, the
//! calibrated bus delays and a repository of uploaded programs with its
//! directory. Both loops reach the store through [`SharedStore`]; the lock
//! is only taken at parked points (apply/save, uploads, reboot), never on
//! the per-half-cycle path.
//!
//! [`MemoryStore`] keeps everything in RAM. [`JsonFileStore`] persists the
//! same image to a JSON document for host-side use.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::config::{BusDelays, ConfigBlock, CONFIG_SIZE};
use crate::constants::{
    DIRECTORY_ENTRY_SIZE, DIRECTORY_SIZE, PROGRAM_BUFFER_SIZE, PROGRAM_NAME_LEN, PROGRAM_SLOTS,
};
use crate::{BridgeError, Result};

/// Configuration persistence
pub trait ConfigStore: Send {
    /// Raw configuration bytes as last saved (erased storage reads 0xFF)
    fn load_config_bytes(&mut self) -> Result<[u8; CONFIG_SIZE]>;

    /// Persist a configuration block
    fn save_config(&mut self, config: &ConfigBlock) -> Result<()>;

    /// Calibrated bus delays
    fn load_bus_delays(&mut self) -> BusDelays;

    /// Persist calibrated bus delays
    fn save_bus_delays(&mut self, delays: BusDelays) -> Result<()>;
}

/// Program repository persistence
pub trait ProgramStore: Send {
    /// Current directory image
    fn directory(&self) -> ProgramDirectory;

    /// Program image stored in `slot`
    fn load_program(&mut self, slot: u8) -> Result<Vec<u8>>;

    /// Store a program image in `slot` under `name`
    fn store_program(&mut self, slot: u8, name: &[u8; PROGRAM_NAME_LEN], image: &[u8]) -> Result<()>;
}

/// Everything the bridge persists
pub trait Storage: ConfigStore + ProgramStore {}

impl<T: ConfigStore + ProgramStore> Storage for T {}

/// Storage shared between the two loops
pub type SharedStore = Arc<Mutex<dyn Storage>>;

/// Load the configuration, substituting factory defaults on any failure
pub fn load_config_or_default(store: &mut dyn Storage) -> ConfigBlock {
    match store.load_config_bytes() {
        Ok(bytes) => ConfigBlock::load_or_default(bytes),
        Err(e) => {
            log::warn!("configuration load failed: {e}, using factory defaults");
            ConfigBlock::defaults()
        }
    }
}

/// One directory entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectoryEntry {
    /// Display name (zero padded)
    pub name: [u8; PROGRAM_NAME_LEN],
    /// Byte offset in the repository
    pub offset: u32,
    /// Program length in bytes
    pub length: u16,
}

/// Directory image: 16 entries of 24 bytes plus a 0xFF terminator
///
/// Entry layout: 18-byte name, 24-bit little-endian repository offset,
/// one reserved byte, 16-bit little-endian length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramDirectory {
    bytes: Vec<u8>,
}

impl ProgramDirectory {
    /// Empty directory
    pub fn new() -> Self {
        let mut bytes = vec![0u8; DIRECTORY_SIZE];
        bytes[DIRECTORY_SIZE - 1] = 0xFF;
        ProgramDirectory { bytes }
    }

    /// Wrap a stored image, repairing its size and terminator
    pub fn from_bytes(mut bytes: Vec<u8>) -> Self {
        bytes.resize(DIRECTORY_SIZE, 0);
        bytes[DIRECTORY_SIZE - 1] = 0xFF;
        ProgramDirectory { bytes }
    }

    /// Raw image as streamed to the host
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Entry of `slot`
    pub fn entry(&self, slot: u8) -> Result<DirectoryEntry> {
        let raw = self.raw_entry(slot)?;
        let mut name = [0u8; PROGRAM_NAME_LEN];
        name.copy_from_slice(&raw[..PROGRAM_NAME_LEN]);
        Ok(DirectoryEntry {
            name,
            offset: u32::from_le_bytes([raw[18], raw[19], raw[20], 0]),
            length: u16::from_le_bytes([raw[22], raw[23]]),
        })
    }

    /// Record a program stored in `slot`
    pub fn set_entry(&mut self, slot: u8, name: &[u8; PROGRAM_NAME_LEN], length: u16) -> Result<()> {
        check_slot(slot)?;
        let start = slot as usize * DIRECTORY_ENTRY_SIZE;
        let raw = &mut self.bytes[start..start + DIRECTORY_ENTRY_SIZE];
        raw[..PROGRAM_NAME_LEN].copy_from_slice(name);
        raw[18] = 0;
        raw[19] = 0;
        raw[20] = slot;
        raw[21] = 0;
        raw[22..24].copy_from_slice(&length.to_le_bytes());
        Ok(())
    }

    fn raw_entry(&self, slot: u8) -> Result<&[u8]> {
        check_slot(slot)?;
        let start = slot as usize * DIRECTORY_ENTRY_SIZE;
        Ok(&self.bytes[start..start + DIRECTORY_ENTRY_SIZE])
    }
}

impl Default for ProgramDirectory {
    fn default() -> Self {
        Self::new()
    }
}

fn check_slot(slot: u8) -> Result<()> {
    if (slot as usize) < PROGRAM_SLOTS {
        Ok(())
    } else {
        Err(BridgeError::SlotOutOfRange(slot))
    }
}

/// In-RAM storage
#[derive(Debug, Clone)]
pub struct MemoryStore {
    config: [u8; CONFIG_SIZE],
    delays: BusDelays,
    directory: ProgramDirectory,
    repository: Vec<u8>,
}

impl MemoryStore {
    /// Erased storage: no configuration, default delays, empty directory
    pub fn new() -> Self {
        MemoryStore {
            config: [0xFF; CONFIG_SIZE],
            delays: BusDelays::default(),
            directory: ProgramDirectory::new(),
            repository: vec![0xFF; PROGRAM_SLOTS * PROGRAM_BUFFER_SIZE],
        }
    }

    /// Storage holding `config`
    pub fn with_config(config: &ConfigBlock) -> Self {
        let mut store = Self::new();
        store.config = *config.as_bytes();
        store
    }

    fn to_image(&self) -> StorageImage {
        let slots = (0..PROGRAM_SLOTS as u8)
            .map(|slot| self.program_bytes(slot).map(<[u8]>::to_vec).unwrap_or_default())
            .collect();
        StorageImage {
            config: self.config.to_vec(),
            bus_delays: self.delays,
            directory: self.directory.as_bytes().to_vec(),
            slots,
        }
    }

    fn from_image(image: StorageImage) -> Result<Self> {
        let mut store = Self::new();
        if image.config.len() == CONFIG_SIZE {
            store.config.copy_from_slice(&image.config);
        }
        store.delays = image.bus_delays;
        store.directory = ProgramDirectory::from_bytes(image.directory);
        for (slot, program) in image.slots.iter().enumerate().take(PROGRAM_SLOTS) {
            if program.len() > PROGRAM_BUFFER_SIZE {
                return Err(BridgeError::PayloadSize(format!(
                    "slot {slot} holds {} bytes",
                    program.len()
                )));
            }
            let start = slot * PROGRAM_BUFFER_SIZE;
            store.repository[start..start + program.len()].copy_from_slice(program);
        }
        Ok(store)
    }

    fn program_bytes(&self, slot: u8) -> Result<&[u8]> {
        let entry = self.directory.entry(slot)?;
        let start = entry.offset as usize;
        let end = start + entry.length as usize;
        self.repository.get(start..end).ok_or_else(|| {
            BridgeError::PayloadSize(format!(
                "slot {slot} entry points outside the repository ({start}..{end})"
            ))
        })
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore for MemoryStore {
    fn load_config_bytes(&mut self) -> Result<[u8; CONFIG_SIZE]> {
        Ok(self.config)
    }

    fn save_config(&mut self, config: &ConfigBlock) -> Result<()> {
        self.config = *config.as_bytes();
        Ok(())
    }

    fn load_bus_delays(&mut self) -> BusDelays {
        self.delays
    }

    fn save_bus_delays(&mut self, delays: BusDelays) -> Result<()> {
        self.delays = delays;
        Ok(())
    }
}

impl ProgramStore for MemoryStore {
    fn directory(&self) -> ProgramDirectory {
        self.directory.clone()
    }

    fn load_program(&mut self, slot: u8) -> Result<Vec<u8>> {
        Ok(self.program_bytes(slot)?.to_vec())
    }

    fn store_program(&mut self, slot: u8, name: &[u8; PROGRAM_NAME_LEN], image: &[u8]) -> Result<()> {
        check_slot(slot)?;
        if image.len() > PROGRAM_BUFFER_SIZE - PROGRAM_NAME_LEN {
            return Err(BridgeError::PayloadSize(format!(
                "program of {} bytes does not fit slot {slot}",
                image.len()
            )));
        }
        let start = slot as usize * PROGRAM_BUFFER_SIZE;
        self.repository[start..start + image.len()].copy_from_slice(image);
        self.directory.set_entry(slot, name, image.len() as u16)
    }
}

/// Serialized storage image
#[derive(Debug, Serialize, Deserialize)]
struct StorageImage {
    config: Vec<u8>,
    bus_delays: BusDelays,
    directory: Vec<u8>,
    slots: Vec<Vec<u8>>,
}

/// Host-side storage persisted as a JSON document
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    inner: MemoryStore,
}

impl JsonFileStore {
    /// Open the document at `path`, starting erased if it does not exist
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let inner = if path.exists() {
            let text = fs::read_to_string(&path)?;
            MemoryStore::from_image(serde_json::from_str(&text)?)?
        } else {
            MemoryStore::new()
        };
        Ok(JsonFileStore { path, inner })
    }

    /// Document path
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self) -> Result<()> {
        let text = serde_json::to_string(&self.inner.to_image())?;
        fs::write(&self.path, text)?;
        Ok(())
    }
}

impl ConfigStore for JsonFileStore {
    fn load_config_bytes(&mut self) -> Result<[u8; CONFIG_SIZE]> {
        self.inner.load_config_bytes()
    }

    fn save_config(&mut self, config: &ConfigBlock) -> Result<()> {
        self.inner.save_config(config)?;
        self.persist()
    }

    fn load_bus_delays(&mut self) -> BusDelays {
        self.inner.load_bus_delays()
    }

    fn save_bus_delays(&mut self, delays: BusDelays) -> Result<()> {
        self.inner.save_bus_delays(delays)?;
        self.persist()
    }
}

impl ProgramStore for JsonFileStore {
    fn directory(&self) -> ProgramDirectory {
        self.inner.directory()
    }

    fn load_program(&mut self, slot: u8) -> Result<Vec<u8>> {
        self.inner.load_program(slot)
    }

    fn store_program(&mut self, slot: u8, name: &[u8; PROGRAM_NAME_LEN], image: &[u8]) -> Result<()> {
        self.inner.store_program(slot, name, image)?;
        self.persist()
    }
}
