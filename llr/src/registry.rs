//! Devices and LLR instances.
//!
//! Instances are keyed by (device, group, link). Lookups hand out
//! `Arc<Llr>` clones, so an instance removed by [`LlrRegistry::del`] stays
//! valid memory for callers still holding it, but no handler of it runs
//! once `del` has returned.

use std::collections::BTreeMap;
use std::sync::Arc;

use common::sync::SpinLock;

use crate::device::LlrDevice;
use crate::error::{LlrError, Result};
use crate::instance::{Llr, LlrKey};

enum Slot {
    /// Being built by `new_llr`; invisible to lookups.
    Reserved,
    Ready(Arc<Llr>),
}

pub struct LlrRegistry {
    devices: SpinLock<BTreeMap<u8, Arc<LlrDevice>>>,
    llrs: SpinLock<BTreeMap<LlrKey, Slot>>,
}

impl LlrRegistry {
    pub const fn new() -> Self {
        Self {
            devices: SpinLock::new(BTreeMap::new()),
            llrs: SpinLock::new(BTreeMap::new()),
        }
    }

    pub fn device_add(&self, device: LlrDevice) -> Result<Arc<LlrDevice>> {
        let num = device.num();
        let mut devices = self.devices.lock();
        if devices.contains_key(&num) {
            return Err(LlrError::AlreadyExists);
        }
        let device = Arc::new(device);
        devices.insert(num, device.clone());
        Ok(device)
    }

    /// Forget device `num`. Fails while it still hosts instances.
    pub fn device_del(&self, num: u8) -> Result<()> {
        if self.llrs.lock().keys().any(|key| key.dev == num) {
            log::warn!("llr device {} still has instances", num);
            return Err(LlrError::Busy);
        }
        self.devices.lock().remove(&num).map(|_| ()).ok_or(LlrError::NotFound)
    }

    pub fn device(&self, num: u8) -> Option<Arc<LlrDevice>> {
        self.devices.lock().get(&num).cloned()
    }

    /// Create the instance for (`dev`, `grp`, `link`) in state `New` with
    /// its hardware idle.
    pub fn new_llr(&self, dev: u8, grp: u8, link: u8) -> Result<Arc<Llr>> {
        let key = LlrKey::new(dev, grp, link);
        let device = self.device(dev).ok_or(LlrError::NotFound)?;

        if grp >= device.generation().max_ports() {
            log::error!("{}: group out of range (max {})", key, device.generation().max_ports());
            return Err(LlrError::InvalidArgument("group"));
        }
        if link >= device.generation().max_links() {
            log::error!("{}: link out of range (max {})", key, device.generation().max_links());
            return Err(LlrError::InvalidArgument("link"));
        }

        {
            let mut llrs = self.llrs.lock();
            if llrs.contains_key(&key) {
                log::debug!("{}: exists", key);
                return Err(LlrError::AlreadyExists);
            }
            llrs.insert(key, Slot::Reserved);
        }

        match Llr::new(key, device) {
            Ok(llr) => {
                self.llrs.lock().insert(key, Slot::Ready(llr.clone()));
                Ok(llr)
            }
            Err(e) => {
                log::error!("{}: new failed [{}]", key, e);
                self.llrs.lock().remove(&key);
                Err(e)
            }
        }
    }

    pub fn get(&self, dev: u8, grp: u8, link: u8) -> Result<Arc<Llr>> {
        match self.llrs.lock().get(&LlrKey::new(dev, grp, link)) {
            Some(Slot::Ready(llr)) => Ok(llr.clone()),
            _ => Err(LlrError::NotFound),
        }
    }

    /// Remove the instance and release everything it holds.
    ///
    /// Blocks until a handler of the instance that is already running has
    /// finished, including its callback.
    pub fn del(&self, dev: u8, grp: u8, link: u8) -> Result<()> {
        let key = LlrKey::new(dev, grp, link);

        let llr = {
            let mut llrs = self.llrs.lock();
            match llrs.remove(&key) {
                Some(Slot::Ready(llr)) => llr,
                Some(Slot::Reserved) => {
                    llrs.insert(key, Slot::Reserved);
                    return Err(LlrError::NotFound);
                }
                None => return Err(LlrError::NotFound),
            }
        };

        llr.teardown();
        Ok(())
    }

    /// Keys of every live instance, in order.
    pub fn keys(&self) -> Vec<LlrKey> {
        self.llrs
            .lock()
            .iter()
            .filter(|(_, slot)| matches!(slot, Slot::Ready(_)))
            .map(|(key, _)| *key)
            .collect()
    }
}

impl Default for LlrRegistry {
    fn default() -> Self {
        Self::new()
    }
}
