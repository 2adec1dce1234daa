//! LLR interrupt dispatch.
//!
//! Handlers do the minimum in interrupt context: record the latched
//! flags, mask the source and queue the matching work item.

use std::sync::Arc;

use drivers::platform::LlrIntr;
use drivers::{IntrFlags, IntrHandler};

use crate::error::Result;
use crate::instance::Llr;
use crate::work::WorkItem;

const fn intr_work_item(intr: LlrIntr) -> WorkItem {
    match intr {
        LlrIntr::SetupUnexpLoopTime => WorkItem::SetupUnexpLoopTimeIntr,
        LlrIntr::SetupLoopTime => WorkItem::SetupLoopTimeIntr,
        LlrIntr::StartInitComplete => WorkItem::StartInitCompleteIntr,
    }
}

impl Llr {
    /// Register a handler for every source the generation wires.
    ///
    /// On failure the sources registered so far are released again.
    pub(crate) fn intr_register(self: &Arc<Self>) -> Result<()> {
        let controller = self.device().intr();

        for intr in LlrIntr::ALL {
            let Some(source) = self.hw().intr_source(intr) else {
                log::debug!("{}: no {} interrupt source", self.key(), intr.as_str());
                continue;
            };

            let llr = Arc::downgrade(self);
            let handler: IntrHandler = Arc::new(move |latched: &IntrFlags| {
                if let Some(llr) = llr.upgrade() {
                    llr.intr_hdlr(intr, latched);
                }
            });

            if let Err(e) = controller.register(&source, handler) {
                log::error!("{}: {} register failed [{}]", self.key(), intr.as_str(), e);
                self.intr_unregister();
                return Err(e.into());
            }
            self.with_inner(|inner| inner.intrs[intr.index()].registered = true);
        }

        Ok(())
    }

    pub(crate) fn intr_unregister(&self) {
        let controller = self.device().intr();

        for intr in LlrIntr::ALL {
            let Some(source) = self.hw().intr_source(intr) else {
                continue;
            };
            let registered = self.with_inner(|inner| {
                let record = &mut inner.intrs[intr.index()];
                record.enabled = false;
                core::mem::take(&mut record.registered)
            });
            if !registered {
                continue;
            }
            if let Err(e) = controller.disable(&source) {
                log::warn!("{}: {} disable failed [{}]", self.key(), intr.as_str(), e);
            }
            if let Err(e) = controller.unregister(&source) {
                log::warn!("{}: {} unregister failed [{}]", self.key(), intr.as_str(), e);
            }
        }
    }

    /// Unmask `intr`.
    ///
    /// Returns `Ok(false)` without touching the controller when the
    /// instance is winding down or the generation has no such source.
    pub(crate) fn intr_enable(&self, intr: LlrIntr) -> Result<bool> {
        let Some(source) = self.hw().intr_source(intr) else {
            return Ok(false);
        };

        // mark enabled first so a handler firing right away masks it again
        let (should_stop, was_enabled) = self.with_inner(|inner| {
            if inner.state.should_stop() {
                return (true, false);
            }
            let record = &mut inner.intrs[intr.index()];
            (false, core::mem::replace(&mut record.enabled, true))
        });
        if should_stop {
            log::debug!("{}: {} enable skipped, stopping", self.key(), intr.as_str());
            return Ok(false);
        }
        if was_enabled {
            return Ok(true);
        }

        log::debug!("{}: {} enable", self.key(), intr.as_str());
        if let Err(e) = self.device().intr().enable(&source) {
            self.with_inner(|inner| inner.intrs[intr.index()].enabled = false);
            return Err(e.into());
        }
        Ok(true)
    }

    pub(crate) fn intr_disable(&self, intr: LlrIntr) -> Result<()> {
        let Some(source) = self.hw().intr_source(intr) else {
            return Ok(());
        };

        let was_enabled = self.with_inner(|inner| core::mem::take(&mut inner.intrs[intr.index()].enabled));
        if !was_enabled {
            return Ok(());
        }

        log::debug!("{}: {} disable", self.key(), intr.as_str());
        self.device().intr().disable(&source)?;
        Ok(())
    }

    /// Disable `intr`, logging instead of failing.
    pub(crate) fn intr_quiesce(&self, intr: LlrIntr) {
        if let Err(e) = self.intr_disable(intr) {
            log::warn!("{}: {} disable failed [{}]", self.key(), intr.as_str(), e);
        }
    }

    fn intr_hdlr(self: &Arc<Self>, intr: LlrIntr, latched: &IntrFlags) {
        log::debug!("{}: {} interrupt", self.key(), intr.as_str());

        self.with_inner(|inner| inner.intrs[intr.index()].source = *latched);
        self.intr_quiesce(intr);
        self.work_queue(intr_work_item(intr));
    }
}
