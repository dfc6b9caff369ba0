//! A CLI tool for converting DICOM JSON metadata and tensor sidecars
//! into DIMBLE containers, and for inspecting and exporting them.
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use dimble::container::{Field, LoadedFields};
use dimble::core::{Attribute, AttributeSet, Dtype};
use dimble::json::SidecarError;
use dimble::{EncodeOptions, Error, ExportOptions};
use snafu::{Report, ResultExt, Whatever};
use tracing::{debug, error, Level};

/// Exit code for when the arguments could not be interpreted.
const ERROR_USAGE: i32 = -1;
/// Exit code for when an error emerged while reading an input file.
const ERROR_READ: i32 = -2;
/// Exit code for when an error emerged while writing an output file.
const ERROR_WRITE: i32 = -3;

/// Encode, export and inspect DIMBLE containers
#[derive(Debug, Parser)]
#[command(version)]
struct App {
    #[command(subcommand)]
    command: Command,

    /// Print more information about the operation
    #[arg(short = 'v', long = "verbose", global = true)]
    verbose: bool,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Convert DICOM JSON metadata and a pixel tensor into a container
    Encode {
        /// Path to the DICOM JSON metadata file
        metadata: PathBuf,
        /// Path to the pixel tensor sidecar (`.safetensors`)
        #[arg(short = 'p', long = "pixels")]
        pixels: Option<PathBuf>,
        /// Path to the output container
        #[arg(short = 'o', long = "out")]
        output: PathBuf,
        /// Convert the pixel tensor to this dtype (e.g. `float32`)
        #[arg(long = "dtype")]
        dtype: Option<Dtype>,
        /// Directory for staging the container before it is moved
        /// (default is the directory of the output)
        #[arg(long = "staging-dir")]
        staging_dir: Option<PathBuf>,
    },
    /// Export a container back into DICOM JSON metadata
    Export {
        /// Path to the container
        file: PathBuf,
        /// Output directory
        /// (default is the directory of the container)
        #[arg(short = 'o', long = "out-dir")]
        output_dir: Option<PathBuf>,
        /// Also export the pixel tensor to a `.safetensors` sidecar
        #[arg(long = "pixels")]
        pixels: bool,
        /// Replace exported files which already exist
        #[arg(long = "overwrite")]
        overwrite: bool,
    },
    /// Print selected fields of a container
    Show {
        /// Path to the container
        file: PathBuf,
        /// Field tag to print, such as `00100020` or `(0010,0020)`
        /// (default is every field)
        #[arg(short = 'f', long = "field")]
        fields: Vec<String>,
        /// Region of the pixel tensor, such as `0:2,:,10:20`
        #[arg(long = "slice")]
        slice: Option<String>,
        /// Convert the pixel tensor to this dtype
        #[arg(long = "dtype")]
        dtype: Option<String>,
        /// Device to place the pixel tensor on
        #[arg(long = "device", default_value = "cpu")]
        device: String,
    },
}

fn main() {
    let App { command, verbose } = App::parse();

    tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_max_level(if verbose { Level::DEBUG } else { Level::INFO })
            .with_writer(std::io::stderr)
            .finish(),
    )
    .whatever_context("Could not set up global logging subscriber")
    .unwrap_or_else(|e: Whatever| {
        eprintln!("[ERROR] {}", Report::from_error(e));
    });

    run(command).unwrap_or_else(|e| {
        let code = exit_code(&e);
        error!("{}", Report::from_error(e));
        std::process::exit(code);
    });
}

fn run(command: Command) -> Result<(), Error> {
    match command {
        Command::Encode {
            metadata,
            pixels,
            output,
            dtype,
            staging_dir,
        } => {
            let mut options = EncodeOptions::new();
            if let Some(dtype) = dtype {
                options = options.pixel_dtype(dtype);
            }
            if let Some(dir) = staging_dir {
                options = options.staging_dir(dir);
            }
            options.convert(&metadata, pixels.as_deref(), &output)?;
            debug!("Container saved to {}", output.display());
        }
        Command::Export {
            file,
            output_dir,
            pixels,
            overwrite,
        } => {
            let mut options = ExportOptions::new().pixels(pixels).overwrite(overwrite);
            if let Some(dir) = output_dir {
                options = options.output_dir(dir);
            }
            let path = dimble::export_to_metadata_json(&file, &options)?;
            println!("{}", path.display());
        }
        Command::Show {
            file,
            fields,
            slice,
            dtype,
            device,
        } => {
            let fields: Vec<&str> = fields.iter().map(String::as_str).collect();
            let loaded = match dtype {
                Some(dtype) => {
                    dimble::load_as(&file, &fields, &device, slice.as_deref(), &dtype)?
                }
                None => dimble::load(&file, &fields, &device, slice.as_deref())?,
            };
            print_fields(&loaded);
        }
    }
    Ok(())
}

fn exit_code(e: &Error) -> i32 {
    match e {
        Error::ParseTag { .. }
        | Error::ParseDevice { .. }
        | Error::ParseSlice { .. }
        | Error::UnsupportedDtype { .. }
        | Error::NoFileName { .. } => ERROR_USAGE,
        Error::WriteOutput { .. }
        | Error::PersistOutput { .. }
        | Error::OutputExists { .. }
        | Error::SerializeMetadata { .. }
        | Error::Encode { .. } => ERROR_WRITE,
        Error::Sidecar {
            source: SidecarError::WriteFile { .. },
        } => ERROR_WRITE,
        _ => ERROR_READ,
    }
}

fn print_fields(loaded: &LoadedFields) {
    for (_, field) in loaded.iter() {
        match field {
            Field::Attribute(attribute) => print_attribute(attribute, 0),
            Field::Tensor(tensor) => {
                let pixels = tensor.pixels();
                println!(
                    "{} tensor {} {:?} on {}",
                    dimble::core::tags::PIXEL_DATA,
                    pixels.dtype(),
                    pixels.shape(),
                    tensor.device()
                );
            }
        }
    }
    for tag in loaded.not_found() {
        println!("{} not found", tag);
    }
}

fn print_attribute(attribute: &Attribute, depth: usize) {
    let indent = "  ".repeat(depth);
    match (attribute.items(), attribute.to_str()) {
        (Some(items), _) => {
            println!(
                "{}{} {} ({} items)",
                indent,
                attribute.tag(),
                attribute.vr(),
                items.len()
            );
            for item in items {
                print_item(item, depth + 1);
            }
        }
        (None, Some(text)) => {
            println!("{}{} {} [{}]", indent, attribute.tag(), attribute.vr(), text)
        }
        (None, None) => println!("{}{} {} (placeholder)", indent, attribute.tag(), attribute.vr()),
    }
}

fn print_item(item: &AttributeSet, depth: usize) {
    println!("{}(item)", "  ".repeat(depth));
    for attribute in item.iter() {
        print_attribute(attribute, depth + 1);
    }
}

#[cfg(test)]
mod tests {
    use crate::App;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        App::command().debug_assert();
    }
}
