//
// Copyright 2017-2025 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Benchmarks for line framing, command parsing and registry fan-out

use bytes::BytesMut;
use chatrelay_service::{
    ChatConnection, ClientRegistry, Command, LineCodec, ServerMetrics, SessionId,
};
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::runtime::Runtime;
use tokio_util::codec::Decoder;

fn chat_lines(count: usize) -> Vec<u8> {
    let mut data = Vec::new();
    for i in 0..count {
        data.extend_from_slice(format!("message number {} from the bench\r\n", i).as_bytes());
    }
    data
}

fn bench_line_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("line_decode");

    for count in [1usize, 16, 256] {
        let data = chat_lines(count);
        group.throughput(Throughput::Bytes(data.len() as u64));
        group.bench_with_input(BenchmarkId::new("whole_buffer", count), &data, |b, data| {
            b.iter(|| {
                let mut codec = LineCodec::default();
                let mut buf = BytesMut::from(&data[..]);
                let mut lines = 0;
                while let Ok(Some(line)) = codec.decode(&mut buf) {
                    black_box(line);
                    lines += 1;
                }
                lines
            })
        });
    }

    let data = chat_lines(64);
    group.throughput(Throughput::Bytes(data.len() as u64));
    group.bench_function("seven_byte_reads", |b| {
        b.iter(|| {
            let mut codec = LineCodec::default();
            let mut buf = BytesMut::new();
            let mut lines = 0;
            for chunk in data.chunks(7) {
                buf.extend_from_slice(chunk);
                while let Ok(Some(line)) = codec.decode(&mut buf) {
                    black_box(line);
                    lines += 1;
                }
            }
            lines
        })
    });

    group.finish();
}

fn bench_command_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("command_parse");

    for line in ["hello everyone", "/msg bob see you at eight", "/nick alice", "/list"] {
        group.bench_with_input(BenchmarkId::from_parameter(line), &line, |b, line| {
            b.iter(|| black_box(Command::parse(black_box(line))))
        });
    }

    group.finish();
}

fn bench_broadcast(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("broadcast");

    for recipients in [1u64, 10, 100] {
        let registry = rt.block_on(async {
            let registry = ClientRegistry::new(Arc::new(ServerMetrics::new()));
            for id in 1..=recipients {
                let origin: SocketAddr = format!("127.0.0.1:{}", 40000 + id).parse().unwrap();
                let connection =
                    ChatConnection::new(tokio::io::sink(), SessionId::new(id), origin, None);
                registry
                    .try_register(&connection, &format!("user{}", id))
                    .await
                    .unwrap();
            }
            registry
        });

        group.throughput(Throughput::Elements(recipients));
        group.bench_with_input(
            BenchmarkId::from_parameter(recipients),
            &registry,
            |b, registry| {
                b.to_async(&rt).iter(|| async {
                    registry
                        .broadcast(black_box("<user1> hello there"), Some(SessionId::new(1)))
                        .await
                })
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_line_decode,
    bench_command_parse,
    bench_broadcast
);
criterion_main!(benches);
