// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Ensure concurrent writers and readers never tear the shared buffer.
// Author: Lukas Bower
#![forbid(unsafe_code)]

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use memfs::{BufferStore, FsOps, LengthPolicy, MemFs, Namespace, FILE_INODE};

const CHUNK: usize = 256;
const WRITERS: usize = 4;

#[test]
fn disjoint_writers_keep_their_own_bytes() {
    let fs = Arc::new(MemFs::new(
        Namespace::new("00000001").expect("namespace"),
        BufferStore::new(CHUNK * WRITERS, LengthPolicy::HighWater).expect("store"),
        Duration::from_secs(1),
    ));
    let mut handles = Vec::new();
    for writer in 0..WRITERS {
        let fs = Arc::clone(&fs);
        handles.push(thread::spawn(move || {
            let fill = vec![b'a' + writer as u8; CHUNK];
            for _ in 0..50 {
                let written = fs
                    .write(FILE_INODE, (writer * CHUNK) as u64, &fill)
                    .expect("write");
                assert_eq!(written, CHUNK);
                let _ = fs.read(FILE_INODE, 0, CHUNK * WRITERS).expect("read");
            }
        }));
    }
    for handle in handles {
        handle.join().expect("writer thread panicked");
    }
    let data = fs.read(FILE_INODE, 0, CHUNK * WRITERS).expect("read");
    assert_eq!(data.len(), CHUNK * WRITERS);
    for (writer, chunk) in data.chunks(CHUNK).enumerate() {
        assert!(chunk.iter().all(|byte| *byte == b'a' + writer as u8));
    }
}

#[test]
fn overlapping_writes_are_never_torn() {
    let store = Arc::new(BufferStore::new(CHUNK, LengthPolicy::HighWater).expect("store"));
    let mut handles = Vec::new();
    for writer in 0..WRITERS {
        let store = Arc::clone(&store);
        handles.push(thread::spawn(move || {
            let fill = vec![b'A' + writer as u8; CHUNK];
            for _ in 0..100 {
                store.write(0, &fill).expect("write");
                let snapshot = store.read(0, CHUNK);
                let first = snapshot[0];
                assert!(snapshot.iter().all(|byte| *byte == first));
            }
        }));
    }
    for handle in handles {
        handle.join().expect("writer thread panicked");
    }
}
