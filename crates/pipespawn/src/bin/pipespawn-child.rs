//! Test fixture: a small multi-tool child program selected by its first
//! argument, standing in for the external programs the integration tests
//! spawn. Exit codes and stream contents are the observable outputs.

use std::env;
use std::io::{self, Read, Write};
use std::process::exit;
use std::thread::sleep;
use std::time::Duration;

fn main() {
    let args: Vec<String> = env::args().collect();
    let mode = args.get(1).map(String::as_str).unwrap_or("");

    let code = match mode {
        // Exit with the requested code.
        "exit-code" => args.get(2).and_then(|s| s.parse().ok()).unwrap_or(0),

        // Exit with the number of payload arguments after the mode.
        "return-argc" => (args.len() as i32) - 2,

        // Echo every payload argument to stdout, NUL-terminated, so the
        // parent can compare bytes exactly.
        "echo-argv" => {
            let stdout = io::stdout();
            let mut out = stdout.lock();
            for arg in &args[2..] {
                out.write_all(arg.as_bytes()).unwrap();
                out.write_all(&[0]).unwrap();
            }
            0
        }

        // Exit with the number of bytes read from stdin.
        "stdin-count" => {
            let mut data = Vec::new();
            io::stdin().read_to_end(&mut data).unwrap();
            data.len() as i32
        }

        // Exit with the integer value of the named environment variable,
        // or 0 when it is not set.
        "env-probe" => {
            let name = args.get(2).cloned().unwrap_or_default();
            env::var(&name)
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(0)
        }

        // Write the requested number of bytes of a repeating 16-character
        // cycle to stdout.
        "stdout-data" => {
            let n: usize = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(0);
            let table = b"0123456789abcdef";
            let stdout = io::stdout();
            let mut out = stdout.lock();
            let mut chunk = Vec::with_capacity(4096);
            for i in 0..n {
                chunk.push(table[i % 16]);
                if chunk.len() == 4096 {
                    out.write_all(&chunk).unwrap();
                    chunk.clear();
                }
            }
            out.write_all(&chunk).unwrap();
            0
        }

        // Distinct payloads on each stream.
        "stream-split" => {
            print!("out-data");
            eprint!("err-data");
            0
        }

        // Alternate between the two streams with flushes in between, so the
        // merged order is deterministic under combined mode.
        "interleave" => {
            let stdout = io::stdout();
            let stderr = io::stderr();
            let mut out = stdout.lock();
            let mut err = stderr.lock();
            out.write_all(b"Hello,").unwrap();
            out.flush().unwrap();
            err.write_all(b"It's me!").unwrap();
            err.flush().unwrap();
            out.write_all(b"world!").unwrap();
            out.flush().unwrap();
            err.write_all(b"Yay!").unwrap();
            err.flush().unwrap();
            0
        }

        // Sleep for the given number of milliseconds, then exit cleanly.
        "sleep-ms" => {
            let ms: u64 = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(0);
            sleep(Duration::from_millis(ms));
            0
        }

        // Never exit; the parent has to terminate us.
        "hang" => loop {
            sleep(Duration::from_secs(1));
        },

        // Write one chunk to stdout, wait for the parent's go-ahead byte on
        // stdin, then finish with a second chunk.
        "stdout-poll" => {
            let stdout = io::stdout();
            let mut out = stdout.lock();
            out.write_all(b"Hello, world!").unwrap();
            out.flush().unwrap();
            wait_for_go_ahead();
            out.write_all(b"Goodbye, world!").unwrap();
            0
        }

        // Same handshake on stderr.
        "stderr-poll" => {
            let stderr = io::stderr();
            let mut err = stderr.lock();
            err.write_all(b"Hello, world!").unwrap();
            err.flush().unwrap();
            wait_for_go_ahead();
            err.write_all(b"Goodbye, world!").unwrap();
            0
        }

        _ => {
            eprintln!("pipespawn-child: unknown mode {mode:?}");
            2
        }
    };

    exit(code);
}

fn wait_for_go_ahead() {
    let mut byte = [0u8; 1];
    loop {
        match io::stdin().read(&mut byte) {
            Ok(0) => break,
            Ok(_) if byte[0] == b's' => break,
            Ok(_) => continue,
            Err(_) => break,
        }
    }
}
