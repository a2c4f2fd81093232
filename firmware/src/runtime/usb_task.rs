use embassy_futures::join::join;
use embassy_futures::select::{Either3, select3};
use embassy_stm32 as hal;
use embassy_stm32::Peri;
use embassy_usb::class::cdc_acm::{ControlChanged, Sender};
use embassy_usb::driver::{Driver, EndpointError};

use super::{REPL_RX_QUEUE, REPL_TX_QUEUE, ReplReceiver};
use crate::repl::ReplFrame;
use crate::status;
use crate::usb::{self, ConsolePort, UsbDeviceStrings};

embassy_stm32::bind_interrupts!(struct UsbIrqs {
    USB_UCPD1_2 => embassy_stm32::usb::InterruptHandler<hal::peripherals::USB>;
});

#[embassy_executor::task]
pub async fn run(
    usb: Peri<'static, hal::peripherals::USB>,
    dp: Peri<'static, hal::peripherals::PA12>,
    dm: Peri<'static, hal::peripherals::PA11>,
    storage: &'static mut usb::UsbDeviceStorage,
) -> ! {
    let driver = embassy_stm32::usb::Driver::new(usb, UsbIrqs, dp, dm);
    let (mut device, console) = usb::build(driver, storage, UsbDeviceStrings::default());

    join(device.run(), run_console(console)).await;
    loop {
        core::future::pending::<()>().await;
    }
}

async fn run_console<D>(port: ConsolePort<D>) -> !
where
    D: Driver<'static>,
{
    let ConsolePort {
        mut sender,
        mut receiver,
        control,
    } = port;
    let rx_queue = REPL_RX_QUEUE.sender();
    let tx_queue = REPL_TX_QUEUE.receiver();
    let mut ingress = [0u8; usb::MAX_PACKET_SIZE as usize];
    let mut pending_tx: Option<ReplFrame> = None;

    loop {
        join(receiver.wait_connection(), sender.wait_connection()).await;
        wait_for_dtr(&control, &sender).await;
        pending_tx.take();
        status::set_control_link_attached(true);
        defmt::info!("usb: console connected");

        loop {
            match select3(
                receiver.read_packet(&mut ingress),
                write_next(&mut sender, &mut pending_tx, &tx_queue),
                control.control_changed(),
            )
            .await
            {
                Either3::First(Ok(0)) | Either3::Second(Ok(())) => {}
                Either3::First(Ok(count)) => {
                    let mut frame = ReplFrame::new();
                    if frame.extend_from_slice(&ingress[..count]).is_err() {
                        defmt::warn!("usb: dropping console frame len={} (overflow)", count);
                        continue;
                    }
                    rx_queue.send(frame).await;
                }
                Either3::First(Err(EndpointError::Disabled))
                | Either3::Second(Err(EndpointError::Disabled)) => {
                    defmt::warn!("usb: console endpoint disabled");
                    break;
                }
                Either3::First(Err(_)) => defmt::warn!("usb: console read error"),
                Either3::Second(Err(_)) => defmt::warn!("usb: console write error"),
                Either3::Third(()) => {
                    if !sender.dtr() {
                        defmt::warn!("usb: console host dropped DTR");
                        break;
                    }
                }
            }
        }

        status::set_control_link_attached(false);
    }
}

/// Writes the held frame, fetching a new one from the queue when idle.
///
/// The frame stays in `pending` until the write completes so a cancelled
/// future never loses output.
async fn write_next<D>(
    sender: &mut Sender<'static, D>,
    pending: &mut Option<ReplFrame>,
    queue: &ReplReceiver,
) -> Result<(), EndpointError>
where
    D: Driver<'static>,
{
    if pending.is_none() {
        *pending = Some(queue.receive().await);
    }
    let Some(frame) = pending.as_ref() else {
        return Ok(());
    };
    sender.write_packet(frame).await?;
    *pending = None;
    Ok(())
}

async fn wait_for_dtr<D>(control: &ControlChanged<'static>, sender: &Sender<'static, D>)
where
    D: Driver<'static>,
{
    while !sender.dtr() {
        control.control_changed().await;
    }
}
