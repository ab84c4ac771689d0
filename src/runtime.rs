
// SPDX-License-Identifier: Apache-2.0

//! Peripheral bring-up and the foreground loop.

use core::fmt::Write;

use defmt::{info, warn};
#[allow(unused_imports)]
use defmt_rtt as _;
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{OutputPin, PinState};
use embedded_hal::spi::MODE_3;
use heapless::String;
#[allow(unused_imports)]
use panic_probe as _;
use rp2040_hal::clocks::{init_clocks_and_plls, Clock};
use rp2040_hal::fugit::RateExtU32;
use rp2040_hal::gpio::bank0::{Gpio0, Gpio1, Gpio8};
use rp2040_hal::gpio::{FunctionSio, FunctionUart, Pin, Pins, PullDown, SioOutput};
use rp2040_hal::uart::{DataBits, Enabled, StopBits, UartConfig, UartPeripheral};
use rp2040_hal::{entry, pac, Sio, Spi, Timer, Watchdog};

use ddc112_picoammeter::acquire::Acquisition;
use ddc112_picoammeter::buffer::{AVERAGING_SAMPLES, MIN_SAMPLES_FOR_MEAN};
use ddc112_picoammeter::clocks as synth;
use ddc112_picoammeter::commands::{self, Command};
use ddc112_picoammeter::interrupt::{install, SAMPLE_STORE};
use ddc112_picoammeter::meter::{Advisory, Meter};
use ddc112_picoammeter::range::{RangeProfile, RANGES};
use ddc112_picoammeter::{CONV_CLOCK_HZ, INTEG_CLOCK_HZ, SPI_BAUD_HZ, XOSC_FREQ_HZ};

/// Second-stage bootloader, from [rp2040-boot2](https://docs.rs/rp2040-boot2)
#[link_section = ".boot2"]
#[used]
pub static BOOT2: [u8; 256] = rp2040_boot2::BOOT_LOADER_W25Q080;

/// Calibrated readings are emitted on this cadence.
const READING_PERIOD_US: u64 = 250_000;
/// Window without any conversion before a waiting line is printed.
const SILENCE_PERIOD_US: u64 = 500_000;
/// Consecutive waiting lines before the wiring warning.
const SILENCE_ESCALATE: u32 = 10;
/// Console line capacity; operator commands are short.
const LINE_CAPACITY: usize = 64;

/// Operator console, 115200 8N1 on GPIO0/GPIO1.
type Console = UartPeripheral<
    Enabled,
    pac::UART0,
    (
        Pin<Gpio0, FunctionUart, PullDown>,
        Pin<Gpio1, FunctionUart, PullDown>,
    ),
>;
/// Converter TEST input; high routes the internal test charge to the input.
type TestPin = Pin<Gpio8, FunctionSio<SioOutput>, PullDown>;

/// Main operation loop
#[entry]
fn main() -> ! {
    info!("picoammeter startup");
    let mut pac = pac::Peripherals::take().unwrap();
    let _core = pac::CorePeripherals::take().unwrap();
    let mut watchdog = Watchdog::new(pac.WATCHDOG);
    let sio = Sio::new(pac.SIO);

    let clocks = init_clocks_and_plls(
        XOSC_FREQ_HZ,
        pac.XOSC,
        pac.CLOCKS,
        pac.PLL_SYS,
        pac.PLL_USB,
        &mut pac.RESETS,
        &mut watchdog,
    )
    .ok()
    .unwrap();
    let pins = Pins::new(
        pac.IO_BANK0,
        pac.PADS_BANK0,
        sio.gpio_bank0,
        &mut pac.RESETS,
    );
    let mut timer = Timer::new(pac.TIMER, &mut pac.RESETS, &clocks);

    let uart_pins = (pins.gpio0.into_function(), pins.gpio1.into_function());
    let mut console = UartPeripheral::new(pac.UART0, uart_pins, &mut pac.RESETS)
        .enable(
            UartConfig::new(115_200.Hz(), DataBits::Eight, None, StopBits::One),
            clocks.peripheral_clock.freq(),
        )
        .unwrap();
    let _ = writeln!(console, ">> DDC112 single channel current meter >>");

    // Converter clocks first, so integration cycles are already running by
    // the time the edge interrupt is unmasked.
    let _synth = synth::start(
        pac.PIO0,
        &mut pac.RESETS,
        clocks.system_clock.freq().to_Hz(),
        pins.gpio6.into_function(),
        pins.gpio7.into_function(),
        CONV_CLOCK_HZ,
        INTEG_CLOCK_HZ,
    );

    // Frame bus: mode 3, MSB first, DIN held low by the idle 0x00 writes.
    let spi_pins = (
        pins.gpio19.into_function(),
        pins.gpio16.into_function(),
        pins.gpio18.into_function(),
    );
    let spi = Spi::<_, _, _, 8>::new(pac.SPI0, spi_pins).init(
        &mut pac.RESETS,
        clocks.peripheral_clock.freq(),
        SPI_BAUD_HZ.Hz(),
        MODE_3,
    );
    let csn = pins.gpio17.into_push_pull_output_in_state(PinState::High);

    // TEST low = measuring the external input.
    let mut test_pin: TestPin = pins.gpio8.into_push_pull_output_in_state(PinState::Low);

    let data_valid = pins.gpio12.into_pull_up_input();
    install(Acquisition::new(spi, csn), data_valid);

    let mut meter = Meter::new();

    let _ = writeln!(console, "setup complete, awaiting data valid edges");
    let _ = writeln!(
        console,
        "system clock: {} Hz",
        clocks.system_clock.freq().to_Hz()
    );
    let _ = writeln!(
        console,
        "averaging {} samples (min {} for output)",
        AVERAGING_SAMPLES, MIN_SAMPLES_FOR_MEAN
    );
    describe_range(&mut console, meter.range_index(), meter.profile());

    // Brief self-test exercise proves the converter responds before
    // normal measurements start.
    set_test_mode(&mut console, &mut test_pin, true);
    timer.delay_ms(100);
    set_test_mode(&mut console, &mut test_pin, false);

    let mut line: String<LINE_CAPACITY> = String::new();
    let mut line_overflow = false;
    let boot = timer.get_counter().ticks();
    let mut last_reading_us = boot;
    let mut last_capture_us = boot;
    let mut last_silence_us = boot;
    let mut silence_reports = 0u32;

    loop {
        let now = timer.get_counter().ticks();

        if let Some(capture) = SAMPLE_STORE.take() {
            last_capture_us = now;
            silence_reports = 0;

            #[cfg(feature = "trace_indiv_samples")]
            defmt::trace!(
                "sample {=i32} (frame {=[u8]})",
                capture.raw,
                &capture.frame.bytes()[..]
            );

            if let Some(Advisory::Stagnant { run }) = meter.record(capture) {
                warn!("raw code unchanged for {=u32} samples", run);
                let _ = writeln!(
                    console,
                    "warning: raw value unchanged for {} samples, check converter timing",
                    run
                );
            }

            if meter.frame_trace_due() {
                let bytes = meter.last_frame().bytes();
                let _ = writeln!(
                    console,
                    "raw bytes: {:02X} {:02X} {:02X} {:02X} {:02X} | raw={} | buffer {}/{}",
                    bytes[0],
                    bytes[1],
                    bytes[2],
                    bytes[3],
                    bytes[4],
                    capture.raw,
                    meter.buffer().len(),
                    AVERAGING_SAMPLES
                );
            }
        } else if now - last_capture_us > SILENCE_PERIOD_US
            && now - last_silence_us > SILENCE_PERIOD_US
        {
            silence_reports += 1;
            let _ = writeln!(
                console,
                "waiting for data... (samples {}, buffer {}/{}, drops {})",
                meter.total_samples(),
                meter.buffer().len(),
                AVERAGING_SAMPLES,
                SAMPLE_STORE.drops()
            );
            if silence_reports >= SILENCE_ESCALATE {
                warn!("no conversions for {=u32} reports", silence_reports);
                let _ = writeln!(
                    console,
                    "warning: prolonged silence, check converter clocks and wiring"
                );
                silence_reports = 0;
            }
            last_silence_us = now;
        }

        if now - last_reading_us > READING_PERIOD_US {
            if let Some(reading) = meter.reading() {
                let profile = meter.profile();
                let _ = writeln!(
                    console,
                    "I = {:.3} {} (avg of {} samples, range {}, cal {:.3})",
                    reading.amps * profile.display_scale,
                    profile.unit,
                    reading.samples,
                    meter.range_index(),
                    profile.calibration
                );
                last_reading_us = now;
            }
        }

        poll_console(&mut console, &mut line, &mut line_overflow, |cmd, console| {
            dispatch(cmd, console, &mut meter, &mut test_pin);
        });
    }
}

/// Assemble console bytes into newline-terminated lines and hand each
/// parsed command to `handle`. Oversized lines are discarded whole.
fn poll_console(
    console: &mut Console,
    line: &mut String<LINE_CAPACITY>,
    overflow: &mut bool,
    mut handle: impl FnMut(Command, &mut Console),
) {
    let mut chunk = [0u8; 16];
    while console.uart_is_readable() {
        let Ok(count) = console.read_raw(&mut chunk) else {
            break;
        };
        for &byte in &chunk[..count] {
            if byte == b'\n' {
                if !*overflow {
                    if let Some(cmd) = commands::parse(line.as_str()) {
                        handle(cmd, console);
                    }
                }
                line.clear();
                *overflow = false;
            } else if byte != b'\r' && line.push(byte as char).is_err() {
                // Too long to be any command; drop the rest of the line.
                *overflow = true;
            }
        }
    }
}

/// Apply one parsed operator command.
fn dispatch(cmd: Command, console: &mut Console, meter: &mut Meter, test_pin: &mut TestPin) {
    match cmd {
        Command::TestMode(on) => set_test_mode(console, test_pin, on),
        Command::Range(index) => {
            // Out-of-table indices are ignored without comment.
            if let Some(profile) = meter.select_range(index) {
                describe_range(console, index, profile);
            }
        }
        Command::Status => print_status(console, meter),
        Command::Ranges => {
            let _ = writeln!(console, "available ranges:");
            for (index, profile) in RANGES.iter().enumerate() {
                describe_range(console, index as u8, profile);
            }
        }
        Command::Reset => {
            meter.reset_average();
            let _ = writeln!(console, "averaging buffer reset");
        }
    }
}

/// Drive the converter TEST input and report the new mode.
fn set_test_mode(console: &mut Console, test_pin: &mut TestPin, on: bool) {
    test_pin
        .set_state(if on { PinState::High } else { PinState::Low })
        .unwrap();
    let _ = writeln!(
        console,
        "{}",
        if on {
            "test mode enabled: internal test signal active"
        } else {
            "normal mode: external signal measurement"
        }
    );
}

/// One line summarizing a range profile.
fn describe_range(console: &mut Console, index: u8, profile: &RangeProfile) {
    if index == 0 {
        let _ = writeln!(
            console,
            "range {}: external capacitor (max {:.0} pC, {:.1} {} full scale, cal {:.3})",
            index,
            profile.cap_pc,
            profile.full_scale_display(),
            profile.unit,
            profile.calibration
        );
    } else {
        let _ = writeln!(
            console,
            "range {}: internal {:.0} pC ({:.0} {} full scale, cal {:.3})",
            index,
            profile.cap_pc,
            profile.full_scale_display(),
            profile.unit,
            profile.calibration
        );
    }
}

/// The `status` command: counters, buffer fill, range, running average.
fn print_status(console: &mut Console, meter: &Meter) {
    let profile = meter.profile();
    let _ = writeln!(console, "system status:");
    let _ = writeln!(console, "  total samples: {}", meter.total_samples());
    let _ = writeln!(console, "  dropped edges: {}", SAMPLE_STORE.drops());
    let _ = writeln!(
        console,
        "  buffer: {}/{} (full: {})",
        meter.buffer().len(),
        AVERAGING_SAMPLES,
        if meter.buffer().is_full() { "yes" } else { "no" }
    );
    let _ = writeln!(
        console,
        "  range: {} (cint {:.0} pC, ifs {:.1} {}, cal {:.3})",
        meter.range_index(),
        profile.cap_pc,
        profile.full_scale_display(),
        profile.unit,
        profile.calibration
    );
    if let Some(reading) = meter.reading() {
        let _ = writeln!(
            console,
            "  average: {:.3} {}",
            reading.amps * profile.display_scale,
            profile.unit
        );
    }
}
