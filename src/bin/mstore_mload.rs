use evm_struct_trace::{demo, logging, LocalBackend};

fn main() {
    logging::init();
    let stdout = std::io::stdout();
    let stderr = std::io::stderr();
    demo::run(&LocalBackend, &mut stdout.lock(), &mut stderr.lock());
}
