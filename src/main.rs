use clap::{arg,crate_version,Arg,ArgAction,Command};
use qfscompressor::{qfs,dbpf,crc};
type STDRESULT = Result<(),Box<dyn std::error::Error>>;

const RCH: &str = "unreachable was reached";

fn ok_to_overwrite(path_out: &str) -> bool {
    if let Ok(_f) = std::fs::File::open(path_out) {
        let mut ans = String::new();
        eprint!("{} exists, overwrite? (y/n) ",path_out);
        std::io::stdin().read_line(&mut ans).expect("could not read stdin");
        if ans.trim_end()=="y" || ans.trim_end()=="Y" {
            log::warn!("existing file will be truncated");
            return true;
        }
        return false;
    }
    true
}

fn main() -> STDRESULT
{
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let long_help =
"Examples:
---------
Compress:      `qfscompressor compress -m qfs -i my_expanded -o my_compressed`
Expand:        `qfscompressor expand -m dbpf -i my_record -o my_expanded`
Checksum:      `qfscompressor checksum --record -i my_record`";

    let methods = ["qfs","dbpf"];

    let mut main_cmd = Command::new("qfscompressor")
        .about("Compress and expand QFS (RefPack) streams")
        .after_long_help(long_help)
        .version(crate_version!());
    main_cmd = main_cmd.subcommand(Command::new("compress")
        .arg(arg!(-m --method <METHOD> "raw stream or DBPF record").value_parser(methods)
            .required(true))
        .arg(arg!(-i --input <PATH> "input path").required(true))
        .arg(arg!(-o --output <PATH> "output path").required(true))
        .arg(Arg::new("fast").long("fast").action(ArgAction::SetTrue)
            .help("look at no more than 50 candidates per position"))
        .arg(Arg::new("size-field").long("size-field").action(ArgAction::SetTrue)
            .help("record the compressed size in the header"))
        .about("compress a file"));

    main_cmd = main_cmd.subcommand(Command::new("expand")
        .arg(arg!(-m --method <METHOD> "raw stream or DBPF record").value_parser(methods)
            .required(true))
        .arg(arg!(-i --input <PATH> "input path").required(true))
        .arg(arg!(-o --output <PATH> "output path").required(true))
        .about("expand a file"));

    main_cmd = main_cmd.subcommand(Command::new("checksum")
        .arg(arg!(-i --input <PATH> "input path").required(true))
        .arg(Arg::new("record").long("record").action(ArgAction::SetTrue)
            .help("only the first 250000 bytes count, as in savegame records"))
        .about("print the checksum of a file"));

    let matches = main_cmd.get_matches();

    if let Some(cmd) = matches.subcommand_matches("compress") {
        let path_in = cmd.get_one::<String>("input").expect(RCH);
        let path_out = cmd.get_one::<String>("output").expect(RCH);
        let method = cmd.get_one::<String>("method").expect(RCH);
        if !ok_to_overwrite(path_out) {
            eprintln!("abort operation");
            return Ok(());
        }
        let mut opt = match cmd.get_flag("fast") {
            true => qfs::FAST_OPTIONS,
            false => qfs::STD_OPTIONS
        };
        opt.compressed_size_field = cmd.get_flag("size-field");
        let mut in_file = std::fs::File::open(path_in)?;
        let mut out_file = std::fs::OpenOptions::new().write(true).truncate(true).create(true).open(path_out)?;
        let (in_size,out_size) = match method.as_str() {
            "qfs" => qfs::compress(&mut in_file,&mut out_file,&opt)?,
            "dbpf" => dbpf::compress(&mut in_file,&mut out_file,&opt)?,
            _ => {
                eprintln!("{} not supported",method);
                return Err(Box::new(std::fmt::Error));
            }
        };
        eprintln!("compressed {} into {}",in_size,out_size);
    }

    if let Some(cmd) = matches.subcommand_matches("expand") {
        let path_in = cmd.get_one::<String>("input").expect(RCH);
        let path_out = cmd.get_one::<String>("output").expect(RCH);
        let method = cmd.get_one::<String>("method").expect(RCH);
        if !ok_to_overwrite(path_out) {
            eprintln!("abort operation");
            return Ok(());
        }
        // expand fully before touching the output, nothing partial is left behind on error
        let dat = std::fs::read(path_in)?;
        let expanded = match method.as_str() {
            "qfs" => qfs::expand_slice(&dat,&qfs::STD_OPTIONS)?,
            "dbpf" => dbpf::expand_slice(&dat,&qfs::STD_OPTIONS)?,
            _ => {
                eprintln!("{} not supported",method);
                return Err(Box::new(std::fmt::Error));
            }
        };
        std::fs::write(path_out,&expanded)?;
        eprintln!("expanded {} into {}",dat.len(),expanded.len());
    }

    if let Some(cmd) = matches.subcommand_matches("checksum") {
        let path_in = cmd.get_one::<String>("input").expect(RCH);
        let dat = std::fs::read(path_in)?;
        let sum = match cmd.get_flag("record") {
            true => crc::record_checksum(&dat,0),
            false => crc::checksum(&dat)
        };
        println!("{:08x}",sum);
    }

    Ok(())
}
