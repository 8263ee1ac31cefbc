#![forbid(unsafe_code)]

fn main() -> std::io::Result<std::process::ExitCode> {
    sx_clock_ctl::ctl_main()
}
