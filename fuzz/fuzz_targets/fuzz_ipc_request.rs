#![no_main]

use keepkey_daemon::ipc::IpcRequest;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // The IPC server reads one request per line from an untrusted peer
    let Ok(line) = std::str::from_utf8(data) else {
        return;
    };

    if let Ok(request) = serde_json::from_str::<IpcRequest>(line.trim()) {
        let reserialized = serde_json::to_string(&request).unwrap();
        let request2: IpcRequest = serde_json::from_str(&reserialized).unwrap();
        assert_eq!(request, request2);
    }
});
