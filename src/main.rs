use std::path;
use std::process;
use std::time::Duration;

use bytesize::ByteSize;
use clap::ArgEnum;
use env_logger;
use log;

use line_ext_sort::{BlankLines, ExternalSorterBuilder, MergeStrategy};

fn main() {
    let arg_parser = build_arg_parser();

    let log_level: LogLevel = arg_parser.value_of_t_or_exit("log_level");
    init_logger(log_level);

    let blank_lines: BlankLinesArg = arg_parser.value_of_t_or_exit("blank_lines");
    let merge: MergeArg = arg_parser.value_of_t_or_exit("merge");
    let chunk_size: usize = arg_parser.value_of_t_or_exit("chunk_size");
    let tmp_dir: Option<&str> = arg_parser.value_of("tmp_dir");
    let rw_buf_size: Option<&str> = arg_parser.value_of("rw_buf_size");

    let input = path::Path::new(arg_parser.value_of("input").expect("value is required"));
    let output = path::Path::new(arg_parser.value_of("output").expect("value is required"));

    let mut sorter_builder = ExternalSorterBuilder::new()
        .with_chunk_size(chunk_size)
        .with_blank_lines(blank_lines.into())
        .with_merge_strategy(merge.into());

    if let Some(tmp_dir) = tmp_dir {
        sorter_builder = sorter_builder.with_tmp_dir(path::Path::new(tmp_dir));
    }

    if let Some(rw_buf_size) = rw_buf_size {
        let rw_buf_size = parse_buf_size(rw_buf_size).expect("value is pre-validated");
        sorter_builder = sorter_builder.with_rw_buf_size(rw_buf_size);
    }

    let sorter = match sorter_builder.build() {
        Ok(sorter) => sorter,
        Err(err) => {
            log::error!("sorter initialization error: {}", err);
            process::exit(1);
        }
    };

    let report = match sorter.sort(input, output) {
        Ok(report) => report,
        Err(err) => {
            log::error!("data sorting error: {}", err);
            process::exit(1);
        }
    };

    log::info!("sorting time: {}", seconds(report.chunking.elapsed()));
    log::info!("merging time: {}", seconds(report.merging.elapsed()));
    log::info!(
        "sorting completed successfully ({} records, {} chunks). time: {}",
        report.records,
        report.chunks,
        seconds(report.elapsed())
    );
}

fn parse_buf_size(value: &str) -> Result<usize, String> {
    let size = value
        .parse::<ByteSize>()
        .map_err(|err| format!("Buffer size format incorrect: {}", err))?;
    match usize::try_from(size.as_u64()) {
        Ok(0) => Err("Buffer size must be greater than zero".to_string()),
        Ok(size) => Ok(size),
        Err(_) => Err(format!("Buffer size {} exceeds the addressable memory", size)),
    }
}

fn seconds(duration: Duration) -> String {
    format!("{:.3} seconds", duration.as_secs_f64())
}

#[derive(Copy, Clone, clap::ArgEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn possible_values() -> impl Iterator<Item = clap::PossibleValue<'static>> {
        Self::value_variants().iter().filter_map(|v| v.to_possible_value())
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <LogLevel as clap::ArgEnum>::from_str(s, false)
    }
}

#[derive(Copy, Clone, clap::ArgEnum)]
enum BlankLinesArg {
    DropLeading,
    Keep,
}

impl BlankLinesArg {
    pub fn possible_values() -> impl Iterator<Item = clap::PossibleValue<'static>> {
        Self::value_variants().iter().filter_map(|v| v.to_possible_value())
    }
}

impl std::str::FromStr for BlankLinesArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <BlankLinesArg as clap::ArgEnum>::from_str(s, false)
    }
}

impl From<BlankLinesArg> for BlankLines {
    fn from(arg: BlankLinesArg) -> Self {
        match arg {
            BlankLinesArg::DropLeading => BlankLines::DropLeading,
            BlankLinesArg::Keep => BlankLines::Keep,
        }
    }
}

#[derive(Copy, Clone, clap::ArgEnum)]
enum MergeArg {
    BinaryHeap,
    LinearScan,
}

impl MergeArg {
    pub fn possible_values() -> impl Iterator<Item = clap::PossibleValue<'static>> {
        Self::value_variants().iter().filter_map(|v| v.to_possible_value())
    }
}

impl std::str::FromStr for MergeArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <MergeArg as clap::ArgEnum>::from_str(s, false)
    }
}

impl From<MergeArg> for MergeStrategy {
    fn from(arg: MergeArg) -> Self {
        match arg {
            MergeArg::BinaryHeap => MergeStrategy::BinaryHeap,
            MergeArg::LinearScan => MergeStrategy::LinearScan,
        }
    }
}

fn build_arg_parser() -> clap::ArgMatches {
    clap::App::new("line-ext-sort")
        .about("external sorter for newline-delimited text files")
        .arg(
            clap::Arg::new("input")
                .short('i')
                .long("input")
                .help("file to be sorted")
                .required(true)
                .takes_value(true),
        )
        .arg(
            clap::Arg::new("output")
                .short('o')
                .long("output")
                .help("result file")
                .required(true)
                .takes_value(true),
        )
        .arg(
            clap::Arg::new("tmp_dir")
                .short('d')
                .long("tmp-dir")
                .help("existing directory to store chunk files in, a temporary one is created if omitted")
                .takes_value(true),
        )
        .arg(
            clap::Arg::new("chunk_size")
                .short('c')
                .long("chunk-size")
                .help("maximum number of lines sorted in memory at once")
                .takes_value(true)
                .default_value("200000")
                .validator(|v| match v.parse::<usize>() {
                    Ok(0) => Err("Chunk size must be greater than zero".to_string()),
                    Ok(_) => Ok(()),
                    Err(err) => Err(format!("Chunk size format incorrect: {}", err)),
                }),
        )
        .arg(
            clap::Arg::new("rw_buf_size")
                .long("rw-buf-size")
                .help("read/write buffer size, e.g. 64KiB")
                .takes_value(true)
                .validator(parse_buf_size),
        )
        .arg(
            clap::Arg::new("blank_lines")
                .short('b')
                .long("blank-lines")
                .help("blank line policy")
                .takes_value(true)
                .default_value("drop-leading")
                .possible_values(BlankLinesArg::possible_values()),
        )
        .arg(
            clap::Arg::new("merge")
                .short('m')
                .long("merge")
                .help("chunk merge strategy")
                .takes_value(true)
                .default_value("binary-heap")
                .possible_values(MergeArg::possible_values()),
        )
        .arg(
            clap::Arg::new("log_level")
                .short('l')
                .long("loglevel")
                .help("logging level")
                .takes_value(true)
                .default_value("info")
                .possible_values(LogLevel::possible_values()),
        )
        .get_matches()
}

fn init_logger(log_level: LogLevel) {
    env_logger::Builder::new()
        .filter_level(match log_level {
            LogLevel::Off => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        })
        .format_timestamp_millis()
        .init();
}

#[cfg(test)]
mod test {
    use rstest::*;

    use super::parse_buf_size;

    #[rstest]
    #[case("1", Some(1))]
    #[case("64KiB", Some(64 * 1024))]
    #[case("0", None)]
    #[case("0KiB", None)]
    #[case("many", None)]
    fn test_parse_buf_size(#[case] value: &str, #[case] expected: Option<usize>) {
        assert_eq!(parse_buf_size(value).ok(), expected);
    }
}
