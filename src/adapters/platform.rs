//! Platform control adapters.
//!
//! - **`cortex-m` feature on `target_os = "none"`**: [`CortexMPlatform`]
//!   performs the real vector-table jump and system reset.
//! - **`not(target_os = "none")`**: [`SimPlatform`] records what the core
//!   asked for, and [`StdDelay`] sleeps the host thread.

use crate::app::ports::{EntryPoint, PlatformControl};

// ── Cortex-M ──────────────────────────────────────────────────

/// Direct control of a Cortex-M core.
#[cfg(all(feature = "cortex-m", target_os = "none"))]
pub struct CortexMPlatform;

#[cfg(all(feature = "cortex-m", target_os = "none"))]
impl PlatformControl for CortexMPlatform {
    fn jump_to(&mut self, entry: EntryPoint) {
        use cortex_m::peripheral::Peripherals;

        cortex_m::interrupt::disable();

        // SAFETY: interrupts are off and nothing else runs; the bootloader
        // is handing over the whole core.
        unsafe {
            let mut p = Peripherals::steal();

            p.SYST.disable_interrupt();
            p.SYST.disable_counter();

            for i in 0..8 {
                p.NVIC.icer[i].write(0xFFFF_FFFF);
                p.NVIC.icpr[i].write(0xFFFF_FFFF);
            }
            // PENDSVCLR | PENDSTCLR
            p.SCB.icsr.write((1 << 27) | (1 << 25));
            p.SCB.vtor.write(entry.vector_table);

            cortex_m::asm::bootstrap(
                entry.stack_pointer as *const u32,
                entry.reset_vector as *const u32,
            )
        }
    }

    fn reset(&mut self) {
        cortex_m::peripheral::SCB::sys_reset()
    }
}

/// Park the core for good.
#[cfg(all(feature = "cortex-m", target_os = "none"))]
pub fn halt() -> ! {
    cortex_m::interrupt::disable();
    loop {
        cortex_m::asm::wfi();
    }
}

/// Board entry: run the boot pass on the real core.
///
/// Never returns: the core either runs an image or is parked.
#[cfg(all(feature = "cortex-m", target_os = "none"))]
pub fn boot_or_halt<S, E>(
    bootloader: &mut crate::boot::Bootloader,
    store: &mut S,
    sink: &mut E,
) -> !
where
    S: crate::app::ports::PartitionStore,
    E: crate::app::ports::EventSink,
{
    let mut platform = CortexMPlatform;
    if let crate::boot::BootOutcome::Execute(entry) = bootloader.run(store, &mut platform, sink) {
        log::error!("image at 0x{:08x} returned to the bootloader", entry.vector_table);
    }
    halt()
}

// ── Host simulation ───────────────────────────────────────────

/// Records control transfers instead of performing them.
#[cfg(not(target_os = "none"))]
#[derive(Debug, Default)]
pub struct SimPlatform {
    last_jump: Option<EntryPoint>,
    resets: u32,
}

#[cfg(not(target_os = "none"))]
impl SimPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entry point of the most recent `jump_to`, if any.
    pub fn last_jump(&self) -> Option<EntryPoint> {
        self.last_jump
    }

    pub fn resets(&self) -> u32 {
        self.resets
    }
}

#[cfg(not(target_os = "none"))]
impl PlatformControl for SimPlatform {
    fn jump_to(&mut self, entry: EntryPoint) {
        log::info!(
            "sim: jump to 0x{:08x} (sp=0x{:08x} pc=0x{:08x})",
            entry.vector_table,
            entry.stack_pointer,
            entry.reset_vector
        );
        self.last_jump = Some(entry);
    }

    fn reset(&mut self) {
        log::info!("sim: system reset");
        self.resets += 1;
    }
}

/// [`DelayNs`](embedded_hal::delay::DelayNs) backed by `std::thread::sleep`.
#[cfg(not(target_os = "none"))]
#[derive(Debug, Default, Clone, Copy)]
pub struct StdDelay;

#[cfg(not(target_os = "none"))]
impl embedded_hal::delay::DelayNs for StdDelay {
    fn delay_ns(&mut self, ns: u32) {
        std::thread::sleep(std::time::Duration::from_nanos(u64::from(ns)));
    }
}
