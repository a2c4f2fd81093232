use core::cell::RefCell;

use cortex_m::interrupt;
use cortex_m::register::primask;
use critical_section::{self, RawRestoreState};
use defmt_rtt as _;
use embassy_executor::Spawner;
use embassy_stm32 as hal;
use embassy_stm32::exti::ExtiInput;
use embassy_stm32::gpio::{Level, Output, Pull, Speed};
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Channel, Receiver};
use embassy_sync::signal::Signal;
use embassy_time::TICK_HZ;
use static_cell::StaticCell;
use zero_cross_core::config::{ActiveLevel, Pull as SensePull, ZeroCrossConfig};
use zero_cross_core::controller::ZeroCrossRelay;

use crate::relay::RelayPin;
use crate::repl::ReplFrame;
use crate::telemetry::{self, ConfigSummary};
use crate::usb;

mod relay_task;
mod repl_task;
mod telemetry_task;
mod usb_task;
mod zero_cross_task;

critical_section::set_impl!(InterruptCriticalSection);

struct InterruptCriticalSection;

unsafe impl critical_section::Impl for InterruptCriticalSection {
    unsafe fn acquire() -> RawRestoreState {
        let primask = primask::read();
        interrupt::disable();
        primask.is_active()
    }

    unsafe fn release(restore_state: RawRestoreState) {
        if restore_state {
            unsafe {
                interrupt::enable();
            }
        }
    }
}

pub(super) type Controller = ZeroCrossRelay<RelayPin<'static>>;
pub(super) type SharedController = Mutex<CriticalSectionRawMutex, RefCell<Controller>>;

const REPL_QUEUE_DEPTH: usize = 8;

pub(super) type ReplQueue = Channel<CriticalSectionRawMutex, ReplFrame, REPL_QUEUE_DEPTH>;
pub(super) type ReplReceiver =
    Receiver<'static, CriticalSectionRawMutex, ReplFrame, REPL_QUEUE_DEPTH>;

static CONTROLLER: StaticCell<SharedController> = StaticCell::new();
static USB_STORAGE: StaticCell<usb::UsbDeviceStorage> = StaticCell::new();

/// Wakes the relay task when the pending deadline may have moved.
pub(super) static RELAY_WAKE: Signal<CriticalSectionRawMutex, ()> = Signal::new();
pub(super) static REPL_RX_QUEUE: ReplQueue = Channel::new();
pub(super) static REPL_TX_QUEUE: ReplQueue = Channel::new();

const RELAY_POLARITY: ActiveLevel = ActiveLevel::High;

/// Zero-cross sense on PA3 (EXTI3), SSR drive on PA4.
fn controller_config() -> ZeroCrossConfig {
    ZeroCrossConfig::default().with_ticks_per_second(TICK_HZ)
}

#[embassy_executor::main]
pub async fn main(spawner: Spawner) {
    let hal::Peripherals {
        PA3,
        PA4,
        EXTI3,
        USB,
        PA11,
        PA12,
        ..
    } = hal::init(hal::Config::default());

    let config = controller_config();
    let pull = match config.zero_cross_pin.pull {
        SensePull::None => Pull::None,
        SensePull::Up => Pull::Up,
        SensePull::Down => Pull::Down,
    };
    let initial_level = if config.relay_pin.initial_state.is_on() {
        Level::High
    } else {
        Level::Low
    };

    let sense = ExtiInput::new(PA3, EXTI3, pull);
    let relay_pin = RelayPin::new(
        Output::new(PA4, initial_level, Speed::Low),
        RELAY_POLARITY,
    );

    let controller =
        ZeroCrossRelay::new(config, relay_pin).expect("zero-cross configuration rejected");
    let controller: &'static SharedController =
        CONTROLLER.init(Mutex::new(RefCell::new(controller)));

    telemetry::log_config(&ConfigSummary::new(
        &config,
        "PA3",
        "PA4",
        RELAY_POLARITY,
    ));

    spawner
        .spawn(zero_cross_task::run(sense, controller))
        .expect("failed to spawn zero-cross task");
    spawner
        .spawn(relay_task::run(controller))
        .expect("failed to spawn relay task");
    spawner
        .spawn(telemetry_task::run(controller))
        .expect("failed to spawn telemetry task");
    spawner
        .spawn(usb_task::run(
            USB,
            PA12,
            PA11,
            USB_STORAGE.init(usb::UsbDeviceStorage::new()),
        ))
        .expect("failed to spawn USB task");
    spawner
        .spawn(repl_task::run(controller))
        .expect("failed to spawn REPL task");

    core::future::pending::<()>().await;
}
