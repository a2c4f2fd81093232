//! Panic handler: report over RTT, then trap so an attached debugger halts on the fault.

use core::panic::PanicInfo;

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    defmt::error!("relay firmware panic: {}", defmt::Display2Format(info));
    cortex_m::asm::udf()
}
