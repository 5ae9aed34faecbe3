//! Simulated IP carrier.
//!
//! Holds one [`SimCard`] per slot. Motion only advances when [`SimCarrier::tick`]
//! is called, either by a test or by the clock thread started with
//! [`SimCarrier::start_clock`]. Interrupts are raised from `tick` (or
//! [`SimCarrier::service_interrupts`]) when a card requests one and the slot
//! line is enabled; the line is disabled on delivery.

use hy8601_common::hal::error::HalError;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, trace};

use super::card::SimCard;
use crate::carrier::{Carrier, InterruptHandler, VectorTable};
use crate::registers::RegisterWindow;

/// Software carrier with simulated cards.
pub struct SimCarrier {
    cards: Vec<Arc<SimCard>>,
    lines: Box<[AtomicBool]>,
    vectors: VectorTable,
    delivered: AtomicU64,
}

impl SimCarrier {
    /// Carrier with `slots` genuine Hy8601 cards.
    pub fn new(slots: usize) -> Self {
        Self::with_cards((0..slots).map(|_| Arc::new(SimCard::new())).collect())
    }

    /// Carrier with the given cards, slot `n` holding `cards[n]`.
    pub fn with_cards(cards: Vec<Arc<SimCard>>) -> Self {
        let lines = (0..cards.len()).map(|_| AtomicBool::new(false)).collect();
        Self {
            cards,
            lines,
            vectors: VectorTable::new(),
            delivered: AtomicU64::new(0),
        }
    }

    /// Card in `slot`.
    pub fn card(&self, slot: u32) -> Option<Arc<SimCard>> {
        self.cards.get(slot as usize).cloned()
    }

    /// Whether the interrupt line of `slot` is enabled.
    pub fn line_enabled(&self, slot: u32) -> bool {
        self.lines
            .get(slot as usize)
            .is_some_and(|line| line.load(Ordering::SeqCst))
    }

    /// Interrupts delivered to handlers so far.
    pub fn interrupts_delivered(&self) -> u64 {
        self.delivered.load(Ordering::SeqCst)
    }

    /// Advance every card by `steps` and deliver pending interrupts.
    pub fn tick(&self, steps: u32) -> usize {
        for card in &self.cards {
            card.tick(steps);
        }
        self.service_interrupts()
    }

    /// Deliver interrupts for every slot with an enabled line and a
    /// requesting card. Returns how many handlers ran.
    pub fn service_interrupts(&self) -> usize {
        let mut count = 0;
        for (slot, card) in self.cards.iter().enumerate() {
            let Some(vector) = card.irq_pending() else {
                continue;
            };
            if !self.lines[slot].swap(false, Ordering::SeqCst) {
                continue;
            }
            if self.vectors.dispatch(vector) {
                trace!(slot, vector, "simulated interrupt delivered");
                self.delivered.fetch_add(1, Ordering::SeqCst);
                count += 1;
            } else {
                debug!(slot, vector, "spurious interrupt: no handler connected");
            }
        }
        count
    }

    /// Tick this carrier every `period` with `steps` per tick.
    ///
    /// The thread holds only a weak reference and exits once the carrier
    /// is dropped.
    pub fn start_clock(
        self: &Arc<Self>,
        period: Duration,
        steps: u32,
    ) -> std::io::Result<JoinHandle<()>> {
        let weak: Weak<Self> = Arc::downgrade(self);
        std::thread::Builder::new()
            .name("hy8601-sim-clock".into())
            .spawn(move || {
                while let Some(carrier) = weak.upgrade() {
                    carrier.tick(steps);
                    drop(carrier);
                    std::thread::sleep(period);
                }
            })
    }

    fn slot_card(&self, slot: u32) -> Result<&Arc<SimCard>, HalError> {
        self.cards
            .get(slot as usize)
            .ok_or_else(|| HalError::CommunicationError(format!("no module in slot {slot}")))
    }
}

impl Carrier for SimCarrier {
    fn name(&self) -> &'static str {
        "simulation"
    }

    fn map_window(&self, slot: u32) -> Result<Arc<dyn RegisterWindow>, HalError> {
        let card: Arc<dyn RegisterWindow> = self.slot_card(slot)?.clone();
        Ok(card)
    }

    fn int_connect(
        &self,
        slot: u32,
        vector: u8,
        handler: Arc<dyn InterruptHandler>,
    ) -> Result<(), HalError> {
        self.slot_card(slot)?;
        self.vectors.connect(vector, handler)
    }

    fn irq_enable(&self, slot: u32) -> Result<(), HalError> {
        self.slot_card(slot)?;
        self.lines[slot as usize].store(true, Ordering::SeqCst);
        Ok(())
    }
}
