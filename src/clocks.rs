//! Synchronized square-wave synthesis for the converter clocks.

use defmt::debug;
use pio::{Assembler, SetDestination};
use rp2040_hal::gpio::bank0::{Gpio6, Gpio7};
use rp2040_hal::gpio::{FunctionPio0, Pin, PullDown};
use rp2040_hal::pac::{PIO0, RESETS};
use rp2040_hal::pio::{PIOBuilder, PIOExt, PinDir, Running, StateMachineGroup2, PIO, SM0, SM1};

/// PIO cycles per output period: two `set` instructions, one delay slot each.
const CYCLES_PER_PERIOD: u32 = 4;

/// Output pin of the fast (conversion) clock.
pub type ConvClockPin = Pin<Gpio6, FunctionPio0, PullDown>;
/// Output pin of the slow (integration-period) clock.
pub type IntegClockPin = Pin<Gpio7, FunctionPio0, PullDown>;

/// Live handles of the running clock generators.
///
/// Held for the lifetime of the program; the machines free-run without
/// further attention.
pub struct ConverterClocks {
    /// The PIO block owning the shared program.
    _pio: PIO<PIO0>,
    /// Both state machines, phase-locked.
    _machines: StateMachineGroup2<PIO0, SM0, SM1, Running>,
}

/// Fixed-point divider bringing `sys_hz` down to one period per `target_hz`.
///
/// Resolution is 16.8 fixed point; an unrepresentable target lands on the
/// nearest achievable frequency without complaint.
fn divider(sys_hz: u32, target_hz: u32) -> (u16, u8) {
    let ratio = sys_hz as f32 / (CYCLES_PER_PERIOD as f32 * target_hz as f32);
    let int = ratio as u16;
    let frac = ((ratio - f32::from(int)) * 256.0) as u8;
    (int, frac)
}

/// Arm both clock outputs and start them on the same system-clock edge.
///
/// One 4-cycle square-wave template is installed into freshly reset state
/// machines, so a restart after a fault can never leak a partial pulse.
/// Each machine scales the template with its own fractional divider;
/// `sync` zeroes both divider counters and `start` enables both machines in
/// a single control write, keeping the outputs phase-locked from the first
/// cycle.
pub fn start(
    pio0: PIO0,
    resets: &mut RESETS,
    sys_hz: u32,
    conv_pin: ConvClockPin,
    integ_pin: IntegClockPin,
    conv_hz: u32,
    integ_hz: u32,
) -> ConverterClocks {
    let (mut pio, sm0, sm1, _, _) = pio0.split(resets);

    let mut asm = Assembler::<32>::new();
    let mut wrap_target = asm.label();
    let mut wrap_source = asm.label();
    asm.bind(&mut wrap_target);
    asm.set_with_delay(SetDestination::PINS, 1, 1);
    asm.set_with_delay(SetDestination::PINS, 0, 1);
    asm.bind(&mut wrap_source);
    let program = asm.assemble_with_wrap(wrap_source, wrap_target);
    let installed = pio.install(&program).unwrap();

    let (conv_int, conv_frac) = divider(sys_hz, conv_hz);
    let (mut sm_conv, _, _) = PIOBuilder::from_installed_program(unsafe { installed.share() })
        .set_pins(conv_pin.id().num, 1)
        .clock_divisor_fixed_point(conv_int, conv_frac)
        .build(sm0);
    sm_conv.set_pindirs([(conv_pin.id().num, PinDir::Output)]);

    let (integ_int, integ_frac) = divider(sys_hz, integ_hz);
    let (mut sm_integ, _, _) = PIOBuilder::from_installed_program(installed)
        .set_pins(integ_pin.id().num, 1)
        .clock_divisor_fixed_point(integ_int, integ_frac)
        .build(sm1);
    sm_integ.set_pindirs([(integ_pin.id().num, PinDir::Output)]);

    let machines = sm_conv.with(sm_integ).sync().start();

    debug!(
        "clock synthesis armed: {=u32} Hz and {=u32} Hz from {=u32} Hz",
        conv_hz, integ_hz, sys_hz
    );

    ConverterClocks {
        _pio: pio,
        _machines: machines,
    }
}
