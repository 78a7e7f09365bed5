fn main() {
    let code = gsurgery_cli::run(std::env::args_os());
    std::process::exit(i32::from(code));
}
