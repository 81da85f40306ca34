//! Throughput benchmarks

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use vdl::{
    BinaryCodec, Command, Device, FrameCodec, GenericDevice, LineCodec, MockTransport, RingBuffer,
};

fn codec_benchmark(c: &mut Criterion) {
    let payload: Vec<u8> = (0..1024).map(|i| (i % 256) as u8).collect();
    let codec = BinaryCodec::new();
    let command = Command::new(0x10).with_data(payload.clone());
    let frame = codec.encode(&command).unwrap();

    let mut group = c.benchmark_group("binary_codec");
    group.throughput(Throughput::Bytes(frame.len() as u64));

    group.bench_function("encode", |b| {
        b.iter(|| black_box(codec.encode(black_box(&command)).unwrap()))
    });

    group.bench_function("decode", |b| {
        b.iter(|| black_box(codec.decode(black_box(&frame))))
    });

    group.bench_function("frame_length", |b| {
        b.iter(|| black_box(codec.frame_length(black_box(&frame))))
    });

    group.finish();

    let line = LineCodec::new();
    let text = b"1.000000E+00,2.000000E+00,3.000000E+00,4.000000E+00\r\n".repeat(8);
    let mut group = c.benchmark_group("line_codec");
    group.throughput(Throughput::Bytes(text.len() as u64));
    group.bench_function("decode", |b| {
        b.iter(|| black_box(line.decode(black_box(&text))))
    });
    group.finish();
}

fn ring_buffer_benchmark(c: &mut Criterion) {
    let chunk = [0x5Au8; 700];
    let mut out = vec![0u8; 700];

    let mut group = c.benchmark_group("ring_buffer");
    group.throughput(Throughput::Bytes(chunk.len() as u64));

    // 700 of 1024 forces most iterations across the wrap boundary
    group.bench_function("write_read_wrapping", |b| {
        let mut ring = RingBuffer::new(1024);
        b.iter(|| {
            ring.write(black_box(&chunk));
            black_box(ring.read(&mut out))
        })
    });

    group.bench_function("peek_skip", |b| {
        let mut ring = RingBuffer::new(1024);
        b.iter(|| {
            ring.write(black_box(&chunk));
            let n = ring.peek(&mut out);
            ring.skip(n);
            black_box(n)
        })
    });

    group.finish();
}

fn device_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();

    let mock = MockTransport::new();
    let reply = BinaryCodec::new()
        .encode(&Command::new(0x03).with_data(vec![0u8; 64]))
        .unwrap();
    mock.set_auto_response(Some(reply));

    let mut device = GenericDevice::new(mock.clone(), Box::new(BinaryCodec::new()));
    runtime.block_on(device.connect()).unwrap();
    let command = Command::read(0x03, 0x0000, 32);

    let mut group = c.benchmark_group("device");
    group.bench_function("execute_mock", |b| {
        b.iter(|| {
            let response = runtime.block_on(device.execute(black_box(&command))).unwrap();
            mock.clear_written_data();
            black_box(response)
        })
    });

    // same exchange with the reply delivered 7 bytes per read
    mock.set_read_chunk(Some(7));
    group.bench_function("execute_mock_fragmented", |b| {
        b.iter(|| {
            let response = runtime.block_on(device.execute(black_box(&command))).unwrap();
            mock.clear_written_data();
            black_box(response)
        })
    });
    group.finish();
}

criterion_group!(benches, codec_benchmark, ring_buffer_benchmark, device_benchmark);
criterion_main!(benches);
