//! Shared interrupt-line handles.
//!
//! The real board wires the video chip and the interface adapter to the
//! processor's IRQ pin; these handles model that wiring as cloneable cells
//! handed out at construction time. Ownership rules: peripherals assert,
//! the processor never clears a line itself — software must acknowledge
//! through the asserting chip's register interface, which releases it.

use std::cell::Cell;
use std::rc::Rc;

/// Level-triggered, maskable interrupt line (active while asserted).
#[derive(Clone, Debug, Default)]
pub struct IrqLine {
    asserted: Rc<Cell<bool>>,
}

impl IrqLine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assert(&self) {
        self.asserted.set(true);
    }

    /// Release the line. Only the peripheral that asserted it calls this,
    /// from its own acknowledge path.
    pub fn release(&self) {
        self.asserted.set(false);
    }

    pub fn is_asserted(&self) -> bool {
        self.asserted.get()
    }
}

/// Edge-triggered interrupt line. A high-to-low transition latches a
/// pending edge that the processor consumes exactly once.
#[derive(Clone, Debug)]
pub struct NmiLine {
    inner: Rc<NmiState>,
}

#[derive(Debug)]
struct NmiState {
    line_high: Cell<bool>,
    pending: Cell<bool>,
}

impl Default for NmiLine {
    fn default() -> Self {
        Self {
            inner: Rc::new(NmiState {
                line_high: Cell::new(true),
                pending: Cell::new(false),
            }),
        }
    }
}

impl NmiLine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pull_low(&self) {
        if self.inner.line_high.get() {
            self.inner.line_high.set(false);
            self.inner.pending.set(true);
        }
    }

    pub fn release(&self) {
        self.inner.line_high.set(true);
    }

    /// Consume a pending edge, if any.
    pub fn take_edge(&self) -> bool {
        self.inner.pending.replace(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn irq_line_is_shared_between_clones() {
        let line = IrqLine::new();
        let peripheral = line.clone();
        assert!(!line.is_asserted());
        peripheral.assert();
        assert!(line.is_asserted());
        peripheral.release();
        assert!(!line.is_asserted());
    }

    #[test]
    fn nmi_edge_fires_once_per_transition() {
        let line = NmiLine::new();
        line.pull_low();
        assert!(line.take_edge());
        assert!(!line.take_edge());
        // Holding the line low does not produce another edge.
        line.pull_low();
        assert!(!line.take_edge());
        line.release();
        line.pull_low();
        assert!(line.take_edge());
    }
}
