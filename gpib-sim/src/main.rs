//! Demo session against the simulated bus: bring the interface up, find
//! the attached instruments, exchange a query with each, and serial poll
//! for service requests.

use clap::Parser;
use clap_num::maybe_hex;
use env_logger::Env;
use gpib_control::{Board, last_error, last_status};
use gpib_protocol::{BusAddress, Eos, ReadTermination, Timeout};
use gpib_sim::SimBus;
use std::error::Error;

#[derive(Parser)]
#[command(about = "Run a demo session against a simulated GPIB bus", long_about = None)]
struct Args {
    /// Primary addresses of the simulated instruments.
    #[arg(short, long, default_values_t = [5u8, 9u8])]
    address: Vec<u8>,

    /// End-of-string byte for reads, e.g. 0x0a.
    #[arg(short, long, value_parser = maybe_hex::<u8>, default_value = "0x0a")]
    eos: u8,

    /// Timeout rung selection code (0..=17).
    #[arg(short, long, default_value = "13")]
    timeout: u8,
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let timeout = Timeout::from_code(args.timeout)
        .ok_or_else(|| format!("invalid timeout code {}", args.timeout))?;

    let bus = SimBus::new();
    let mut addresses = Vec::new();
    for pad in &args.address {
        let address = BusAddress::new(*pad)?;
        bus.attach(address);
        bus.push_response(address, format!("SIM,INSTR{},0,1.0\n", pad).into_bytes());
        addresses.push(address);
    }
    if let Some(first) = addresses.first() {
        bus.set_status_byte(*first, 0x50);
    }

    let board = Board::<SimBus>::builder()
        .timeout(timeout)
        .eos(Some(Eos::new(args.eos).terminate_read(true)))
        .system_controller(true)
        .build(bus);

    let completion = board.reset_interface();
    if completion.is_err() {
        return Err(format!("interface reset failed: {:?}", last_error()).into());
    }
    log::info!("interface up, status {}", last_status());

    let (found, completion) = board.find_listeners(&addresses, 30);
    log::info!("{} listeners found ({})", completion.count(), completion.status());
    for address in &found {
        println!("listener at {}", address);
    }

    for address in &found {
        board.send(*address, b"*IDN?", gpib_protocol::SendEnd::Eoi);
        let (reply, completion) = board.receive(*address, 256, ReadTermination::Eos(args.eos));
        if completion.is_err() {
            log::warn!("{}: no reply ({:?})", address, completion.error());
            continue;
        }
        println!("{}: {}", address, String::from_utf8_lossy(&reply).trim_end());
    }

    let (index, byte, completion) = board.find_requesting_service(&found);
    if completion.is_err() {
        log::info!("no instrument requests service");
    } else {
        println!("service request from {} (status {:#04x})", found[index], byte);
    }

    Ok(())
}
