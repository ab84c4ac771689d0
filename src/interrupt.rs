//! Interrupt handlers, plus the static [`Mutex`] cells shared with them.

use core::cell::RefCell;

use critical_section::Mutex;
use defmt::debug;
use rp2040_hal::gpio::bank0::{Gpio12, Gpio16, Gpio17, Gpio18, Gpio19};
use rp2040_hal::gpio::{
    FunctionSio, FunctionSpi, Interrupt as PinIrq, Pin, PullDown, PullUp, SioInput, SioOutput,
};
use rp2040_hal::pac::{self, interrupt, SPI0};
use rp2040_hal::spi::{Enabled, Spi};

use crate::acquire::Acquisition;
use crate::store::SampleStore;

/// Bus wired to the converter: MOSI held low on 19, DOUT on 16, DCLK on 18.
pub type ConverterSpi = Spi<
    Enabled,
    SPI0,
    (
        Pin<Gpio19, FunctionSpi, PullDown>,
        Pin<Gpio16, FunctionSpi, PullDown>,
        Pin<Gpio18, FunctionSpi, PullDown>,
    ),
    8,
>;
/// Frame select line (nDXMIT), active low.
pub type SelectPin = Pin<Gpio17, FunctionSio<SioOutput>, PullDown>;
/// Data-valid input (nDVALID); the converter pulls it low once per conversion.
pub type DataValidPin = Pin<Gpio12, FunctionSio<SioInput>, PullUp>;

/// Everything the data-valid interrupt touches.
pub struct AcqContext {
    /// Capture driver owning the bus and select line.
    pub driver: Acquisition<ConverterSpi, SelectPin>,
    /// The edge source itself, kept here so the handler can acknowledge it.
    pub data_valid: DataValidPin,
}

/// Acquisition context for access in interrupts.
///
/// The main loop never touches this cell after [`install`]; the critical
/// section inside the handler exists to satisfy the [`Mutex`], not because
/// a second writer exists.
pub static ACQ_CONTEXT: Mutex<RefCell<Option<AcqContext>>> = Mutex::new(RefCell::new(None));

/// Single-slot handoff written by [`IO_IRQ_BANK0`], drained by the main loop.
pub static SAMPLE_STORE: SampleStore = SampleStore::new();

/// Move the acquisition context into [`ACQ_CONTEXT`] and unmask the edge
/// interrupt. Call once, after the bus and clocks are up.
pub fn install(driver: Acquisition<ConverterSpi, SelectPin>, mut data_valid: DataValidPin) {
    // Discard any edge latched during bring-up before unmasking.
    data_valid.clear_interrupt(PinIrq::EdgeLow);
    data_valid.set_interrupt_enabled(PinIrq::EdgeLow, true);

    debug!("critical_section: install acquisition context");
    critical_section::with(|cs| {
        ACQ_CONTEXT.replace(cs, Some(AcqContext { driver, data_valid }));
    });

    unsafe { pac::NVIC::unmask(pac::Interrupt::IO_IRQ_BANK0) }
}

/// Falling edge on nDVALID: one conversion result is ready.
#[interrupt]
fn IO_IRQ_BANK0() {
    critical_section::with(|cs| {
        let mut ctx = ACQ_CONTEXT.borrow_ref_mut(cs);
        let Some(ctx) = ctx.as_mut() else {
            return;
        };

        if ctx.data_valid.interrupt_status(PinIrq::EdgeLow) {
            ctx.data_valid.clear_interrupt(PinIrq::EdgeLow);
            ctx.driver.on_data_valid(&SAMPLE_STORE);
        }
    });
}
