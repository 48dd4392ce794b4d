// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

fn packages_arg(help: &'static str) -> Arg {
    Arg::new("packages")
        .required(true)
        .num_args(1..)
        .value_name("NEVRA")
        .help(help)
}

fn patterns_arg() -> Arg {
    Arg::new("patterns")
        .required(true)
        .num_args(1..)
        .value_name("REGEX")
        .help("Full-string regular expressions; results are the union of matches")
}

fn module_arg() -> Arg {
    Arg::new("module")
        .short('m')
        .long("module")
        .value_name("NAME:STREAM")
        .action(ArgAction::Append)
        .help("Enabled module stream")
}

fn build_cli() -> Command {
    Command::new("vmaas")
        .version(env!("CARGO_PKG_VERSION"))
        .author("VMaaS Contributors")
        .about("Query package updates and vulnerabilities from a dataset dump")
        .subcommand_required(false)
        .arg(
            Arg::new("dump")
                .short('d')
                .long("dump")
                .value_name("PATH")
                .env("VMAAS_DUMP")
                .global(true)
                .help("Dataset dump (.json, .json.gz or .json.zst)"),
        )
        .subcommand(
            Command::new("updates")
                .about("List available updates for package builds")
                .arg(packages_arg("Package builds (name-[epoch:]version-release.arch)"))
                .arg(
                    Arg::new("repository")
                        .short('r')
                        .long("repository")
                        .value_name("LABEL")
                        .action(ArgAction::Append)
                        .help("Restrict to these content-set labels"),
                )
                .arg(module_arg())
                .arg(Arg::new("releasever").long("releasever").value_name("RELEASEVER"))
                .arg(Arg::new("basearch").long("basearch").value_name("ARCH"))
                .arg(
                    Arg::new("security_only")
                        .long("security-only")
                        .action(ArgAction::SetTrue)
                        .help("Only updates shipped by security errata"),
                ),
        )
        .subcommand(
            Command::new("vulnerabilities")
                .about("Classify CVEs affecting package builds")
                .arg(packages_arg("Package builds"))
                .arg(module_arg()),
        )
        .subcommand(
            Command::new("cves")
                .about("Look up CVEs by regular expression")
                .arg(patterns_arg()),
        )
        .subcommand(
            Command::new("errata")
                .about("Look up errata by regular expression")
                .arg(patterns_arg()),
        )
        .subcommand(
            Command::new("repos")
                .about("Look up repositories by content-set label regular expression")
                .arg(patterns_arg()),
        )
        .subcommand(
            Command::new("packages")
                .about("Show metadata of package builds")
                .arg(packages_arg("Package builds")),
        )
        .subcommand(
            Command::new("pkgtree")
                .about("Show the release history of package names")
                .arg(
                    Arg::new("names")
                        .required(true)
                        .num_args(1..)
                        .value_name("NAME")
                        .help("Package names"),
                ),
        )
        .subcommand(
            Command::new("package-repos")
                .about("Show the content sets shipping package builds")
                .arg(packages_arg("Package builds")),
        )
        .subcommand(Command::new("dbchange").about("Show dataset change timestamps"))
        .subcommand(Command::new("stats").about("Show snapshot entity counts"))
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // Create man directory
    let out_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());
    let man_dir = out_dir.join("man");
    fs::create_dir_all(&man_dir).expect("Failed to create man directory");

    // Generate main man page
    let cmd = build_cli();
    let man = Man::new(cmd);
    let mut buffer = Vec::new();
    man.render(&mut buffer).expect("Failed to render man page");

    let man_path = man_dir.join("vmaas.1");
    fs::write(&man_path, buffer).expect("Failed to write man page");

    println!("cargo:warning=Man page generated at {}", man_path.display());
}
