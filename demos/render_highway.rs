//! Render a highway (or a kilometer range of it) from a GeoJSON export.
//!
//! Run with: cargo run --example render_highway -- <file.geojson> <highway-code> [km-start km-end]
//!
//! Set `RUST_LOG=debug` to follow each degradation step.

use highway_trace::{render_highway, GeoInput, HighwayRequest, TraceConfig};
use std::process::ExitCode;

fn main() -> ExitCode {
    env_logger::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let (path, code) = match args.as_slice() {
        [path, code, ..] => (path, code),
        _ => {
            eprintln!("usage: render_highway <file.geojson> <highway-code> [km-start km-end]");
            return ExitCode::FAILURE;
        }
    };

    let mut request = HighwayRequest::new(code);
    if let [_, _, start, end, ..] = args.as_slice() {
        match (
            start.replace(',', ".").parse::<f64>(),
            end.replace(',', ".").parse::<f64>(),
        ) {
            (Ok(start), Ok(end)) => request = request.with_range(start, end),
            _ => {
                eprintln!("kilometers must be numbers: {start} {end}");
                return ExitCode::FAILURE;
            }
        }
    }

    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) => {
            eprintln!("cannot read {path}: {e}");
            return ExitCode::FAILURE;
        }
    };
    let input = match GeoInput::from_json_str(&text) {
        Ok(input) => input,
        Err(e) => {
            eprintln!("cannot decode {path}: {e}");
            return ExitCode::FAILURE;
        }
    };

    let config = TraceConfig::default();
    let Some(render) = render_highway(&input, &request, &config) else {
        eprintln!("no usable geometry for highway {code}");
        return ExitCode::FAILURE;
    };

    eprintln!(
        "{}: {} chain(s), {:.2} km, {} markers, {}{}",
        render.highway_code,
        render.trace.geometry.chains().len(),
        render.trace.geometry.length_m() / 1000.0,
        render.markers.len(),
        render.trace.provenance.as_str(),
        if render.trace.reversed { ", reversed" } else { "" }
    );

    let collection = render.to_feature_collection(&config);
    println!("{}", geojson::GeoJson::from(collection));
    ExitCode::SUCCESS
}
