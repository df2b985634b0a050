use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use sld_jtag::cable::usbblaster::{UsbBlaster, ALTERA_VID, USB_BLASTER_DESCRIPTION, USB_BLASTER_PID};
use sld_jtag::cable::Cable;
use sld_jtag::config::{Config, DEFAULT_LOADER_INSTANCE, DEFAULT_STALL_LIMIT, DEFAULT_UART_INSTANCE};
use sld_jtag::loader::{parse_image, Endian};
use sld_jtag::session::{Session, GPIO_BITS};
use sld_jtag::statemachine::JtagSM;

#[derive(Parser)]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// USB description of the cable to open
    #[arg(long, default_value = USB_BLASTER_DESCRIPTION)]
    description: String,
    #[arg(long, value_parser = parse_number, default_value_t = ALTERA_VID as u32)]
    vid: u32,
    #[arg(long, value_parser = parse_number, default_value_t = USB_BLASTER_PID as u32)]
    pid: u32,
    /// Clock every bit individually instead of using byte bursts
    #[arg(long)]
    no_burst: bool,
    /// Instance id of the loader node
    #[arg(long, default_value_t = DEFAULT_LOADER_INSTANCE)]
    loader_id: u8,
    /// Instance id of the uart node
    #[arg(long, default_value_t = DEFAULT_UART_INSTANCE)]
    uart_id: u8,
    /// Empty transfers tolerated before giving up on the cable, 0 waits forever
    #[arg(long, default_value_t = DEFAULT_STALL_LIMIT)]
    stall_limit: u32,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read one word of target memory.  Leaves the CPU in reset
    Read {
        #[arg(value_parser = parse_number)]
        address: u32,
    },
    /// Write one word of target memory and show what it replaced.  Leaves the CPU in reset
    Write {
        #[arg(value_parser = parse_number)]
        address: u32,
        #[arg(value_parser = parse_number)]
        value: u32,
    },
    /// Drive the gpio lines of the loader node
    Gpio {
        #[arg(value_parser = parse_gpio)]
        bits: u8,
    },
    /// Load an image at address 0, verify it and start the CPU
    Load {
        #[arg(value_enum)]
        endian: ImageEndian,
        file: PathBuf,
    },
    /// Copy everything the target prints on its uart to stdout
    Console {
        /// Polls per round trip
        #[arg(long, default_value_t = 10)]
        grab: usize,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ImageEndian {
    #[value(alias = "b")]
    Big,
    #[value(alias = "l")]
    Little,
}

impl From<ImageEndian> for Endian {
    fn from(value: ImageEndian) -> Self {
        match value {
            ImageEndian::Big => Endian::Big,
            ImageEndian::Little => Endian::Little,
        }
    }
}

fn parse_number(s: &str) -> Result<u32, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("{s}: {e}"))
}

fn parse_gpio(s: &str) -> Result<u8, String> {
    let bits = parse_number(s)?;
    if bits >> GPIO_BITS != 0 {
        return Err(format!("0x{bits:x} does not fit the {GPIO_BITS}-bit gpio register"));
    }
    Ok(bits as u8)
}

type CliSession = Session<Box<dyn Cable>>;

fn open(cli: &Cli) -> Result<CliSession> {
    let config = Config::default()
        .burst(!cli.no_burst)
        .stall_limit((cli.stall_limit != 0).then_some(cli.stall_limit))
        .loader_instance(cli.loader_id)
        .uart_instance(cli.uart_id);

    let vid = u16::try_from(cli.vid).context("VID out of range")?;
    let pid = u16::try_from(cli.pid).context("PID out of range")?;
    let cable = UsbBlaster::open(vid, pid, &cli.description)
        .with_context(|| format!("opening '{}' ({:04x}:{:04x})", cli.description, vid, pid))?;
    let jtag = JtagSM::with_config(Box::new(cable) as Box<dyn Cable>, &config);

    let mut session = Session::new(jtag, &config);
    session.discover(&[config.loader_instance, config.uart_instance])
        .context("probing the SLD hub")?;
    Ok(session)
}

fn step(message: &str) {
    print!("{message:<18}... ");
    let _ = std::io::stdout().flush();
}

fn load(session: &mut CliSession, endian: Endian, file: &PathBuf) -> Result<()> {
    step("Reading input");
    let bytes = std::fs::read(file).with_context(|| format!("reading {}", file.display()))?;
    let words = parse_image(&bytes, endian);
    println!("done");

    step("Writing to FPGA");
    session.load_image(0, &words)?;
    println!("done");

    step("Verifying input");
    if let Err(err) = session.verify_image(0, &words) {
        println!("FAILED!!!!");
        return Err(err.into());
    }
    println!("done");

    step("Starting CPU");
    session.start_cpu()?;
    println!("done");
    Ok(())
}

fn console(session: &mut CliSession, grab: usize) -> Result<()> {
    let mut stdout = std::io::stdout();
    loop {
        let (received, more) = session.poll_uart(grab)?;
        stdout.write_all(&received)?;
        if !more {
            stdout.flush()?;
            std::thread::sleep(Duration::from_millis(10));
        }
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let mut session = open(&cli)?;

    match cli.command {
        Commands::Read { address } => {
            session.read(address)?;
            let value = session.sm.execute64()? as u32;
            println!("read(0x{address:x}) = 0x{value:x}");
        }
        Commands::Write { address, value } => {
            session.write(address, value, true)?;
            let old = session.sm.execute64()? as u32;
            println!("write(0x{address:x}) = 0x{value:x} (was 0x{old:x})");
        }
        Commands::Gpio { bits } => {
            session.gpio(bits)?;
            session.sm.execute()?;
        }
        Commands::Load { endian, file } => load(&mut session, endian.into(), &file)?,
        Commands::Console { grab } => console(&mut session, grab)?,
    }
    Ok(())
}
