//! Host implementations of the plan's kernels.
//!
//! Each kernel checks its grid against the op's extent, then runs one
//! work-group per rayon task. Written buffers are moved out of device
//! memory for the duration of the launch and put back afterwards.

use gpuml_model::{rotate_pair, RopeStyle, StateBuffer, WeightRef, WeightSet};
use gpuml_plan::{KernelOp, SiluInput, WorkerGrid};
use gpuml_quant::{dot_f32, QuantScheme};
use rayon::prelude::*;

use crate::api::error::{DeviceError, DeviceResult};
use crate::api::types::DeviceMemory;
use crate::core::memory::{dense, matrix};

pub(crate) fn launch(
    kernel: &str,
    op: &KernelOp,
    grid: &WorkerGrid,
    mem: &mut DeviceMemory,
    weights: &WeightSet,
) -> DeviceResult<()> {
    match *op {
        KernelOp::RmsReduce {
            input,
            scratch,
            len,
        } => rms_reduce(kernel, grid, mem, input, scratch, len),
        KernelOp::RmsApply {
            input,
            output,
            scratch,
            weight,
            len,
            eps,
        } => rms_apply(kernel, grid, mem, weights, input, output, scratch, weight, len, eps),
        KernelOp::HeadRmsNorm {
            buffer,
            scratch,
            weight,
            heads,
            head_size,
            eps,
        } => head_rms_norm(kernel, grid, mem, weights, buffer, scratch, weight, heads, head_size, eps),
        KernelOp::Matmul {
            weight,
            input,
            output,
            rows,
            cols,
            bias,
            residual,
            scheme,
        } => matmul(
            kernel,
            grid,
            mem,
            weights,
            Projection {
                weight,
                input,
                output,
                rows,
                cols,
                bias,
                residual,
                scheme,
            },
        ),
        KernelOp::SplitQkv {
            input,
            q,
            k,
            v,
            q_dim,
            kv_dim,
        } => split_qkv(kernel, grid, mem, input, [q, k, v], q_dim, kv_dim),
        KernelOp::Rope {
            q,
            k,
            cos,
            sin,
            n_heads,
            n_kv_heads,
            head_size,
            style,
        } => rope(
            kernel, grid, mem, weights, [q, k], [cos, sin], [n_heads, n_kv_heads], head_size, style,
        ),
        KernelOp::KvCacheWrite {
            k,
            v,
            key_cache,
            value_cache,
            layer,
            kv_dim,
            context_length,
        } => kv_cache_write(
            kernel,
            grid,
            mem,
            [(k, key_cache), (v, value_cache)],
            layer,
            kv_dim,
            context_length,
        ),
        KernelOp::Attention {
            q,
            key_cache,
            value_cache,
            scores,
            output,
            layer,
            n_heads,
            n_kv_heads,
            head_size,
            context_length,
        } => attention(
            kernel,
            grid,
            mem,
            Attend {
                q,
                key_cache,
                value_cache,
                scores,
                output,
                layer,
                n_heads,
                n_kv_heads,
                head_size,
                context_length,
            },
        ),
        KernelOp::SiluGate {
            input,
            output,
            hidden,
        } => silu_gate(kernel, grid, mem, input, output, hidden),
    }
}

fn check_len(kernel: &str, b: StateBuffer, actual: usize, needed: usize) -> DeviceResult<()> {
    if actual < needed {
        return Err(DeviceError::launch(
            kernel,
            format!("'{}' holds {} values, kernel needs {}", b, actual, needed),
        ));
    }
    Ok(())
}

/// Work-groups along dimension 0 and their size, which must tile `extent` exactly.
fn groups_1d(kernel: &str, grid: &WorkerGrid, extent: usize) -> DeviceResult<(usize, usize)> {
    let local = grid.local()[0];
    let groups = grid.groups()[0];
    if groups * local != extent {
        return Err(DeviceError::launch(
            kernel,
            format!("grid {} does not tile {} elements", grid, extent),
        ));
    }
    Ok((groups, local))
}

fn rms_reduce(
    kernel: &str,
    grid: &WorkerGrid,
    mem: &mut DeviceMemory,
    input: StateBuffer,
    scratch: StateBuffer,
    len: usize,
) -> DeviceResult<()> {
    let (groups, local) = groups_1d(kernel, grid, len)?;
    let mut partial = mem.take(kernel, scratch)?;
    let x = mem.data(kernel, input)?;
    check_len(kernel, input, x.len(), len)?;
    check_len(kernel, scratch, partial.len(), groups)?;

    partial[..groups]
        .par_iter_mut()
        .enumerate()
        .for_each(|(g, p)| *p = x[g * local..(g + 1) * local].iter().map(|v| v * v).sum());
    partial[groups..].fill(0.0);
    mem.put(scratch, partial);
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn rms_apply(
    kernel: &str,
    grid: &WorkerGrid,
    mem: &mut DeviceMemory,
    weights: &WeightSet,
    input: StateBuffer,
    output: StateBuffer,
    scratch: StateBuffer,
    weight: WeightRef,
    len: usize,
    eps: f32,
) -> DeviceResult<()> {
    if input == output {
        return Err(DeviceError::launch(kernel, "in-place normalization"));
    }
    let (_, local) = groups_1d(kernel, grid, len)?;
    let w = dense(weights, kernel, weight)?;
    if w.len() < len {
        return Err(DeviceError::launch(kernel, format!("'{}' is shorter than {}", weight, len)));
    }
    let sum: f32 = mem.data(kernel, scratch)?.iter().sum();
    let scale = 1.0 / (sum / len as f32 + eps).sqrt();

    let mut out = mem.take(kernel, output)?;
    let x = mem.data(kernel, input)?;
    check_len(kernel, input, x.len(), len)?;
    check_len(kernel, output, out.len(), len)?;

    out[..len]
        .par_chunks_mut(local)
        .enumerate()
        .for_each(|(g, chunk)| {
            for (j, o) in chunk.iter_mut().enumerate() {
                let i = g * local + j;
                *o = w[i] * (x[i] * scale);
            }
        });
    mem.put(output, out);
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn head_rms_norm(
    kernel: &str,
    grid: &WorkerGrid,
    mem: &mut DeviceMemory,
    weights: &WeightSet,
    buffer: StateBuffer,
    scratch: StateBuffer,
    weight: WeightRef,
    heads: usize,
    head_size: usize,
    eps: f32,
) -> DeviceResult<()> {
    let groups = grid.groups()[0];
    if groups != heads {
        return Err(DeviceError::launch(
            kernel,
            format!("grid {} launches {} groups for {} heads", grid, groups, heads),
        ));
    }
    let w = dense(weights, kernel, weight)?;
    if w.len() != head_size {
        return Err(DeviceError::launch(kernel, format!("'{}' is not {} long", weight, head_size)));
    }

    let mut x = mem.take(kernel, buffer)?;
    let mut ms = mem.take(kernel, scratch)?;
    check_len(kernel, buffer, x.len(), heads * head_size)?;
    check_len(kernel, scratch, ms.len(), heads)?;

    x[..heads * head_size]
        .par_chunks_mut(head_size)
        .zip(ms[..heads].par_iter_mut())
        .for_each(|(head, m)| {
            *m = head.iter().map(|v| v * v).sum::<f32>() / head_size as f32;
            let scale = 1.0 / (*m + eps).sqrt();
            for (v, wi) in head.iter_mut().zip(w) {
                *v = wi * (*v * scale);
            }
        });
    mem.put(buffer, x);
    mem.put(scratch, ms);
    Ok(())
}

struct Projection {
    weight: WeightRef,
    input: StateBuffer,
    output: StateBuffer,
    rows: usize,
    cols: usize,
    bias: Option<WeightRef>,
    residual: bool,
    scheme: QuantScheme,
}

/// One work-group per output row.
fn matmul(
    kernel: &str,
    grid: &WorkerGrid,
    mem: &mut DeviceMemory,
    weights: &WeightSet,
    p: Projection,
) -> DeviceResult<()> {
    if grid.groups()[0] != p.rows {
        return Err(DeviceError::launch(
            kernel,
            format!("grid {} does not launch one group per row of {}", grid, p.rows),
        ));
    }
    if p.input == p.output {
        return Err(DeviceError::launch(kernel, "projection input aliases its output"));
    }
    let w = matrix(weights, kernel, p.weight)?;
    if w.scheme() != p.scheme {
        return Err(DeviceError::launch(
            kernel,
            format!("'{}' is {}, kernel compiled for {}", p.weight, w.scheme(), p.scheme),
        ));
    }
    let block = p.scheme.block_size();
    if p.cols == 0 || p.cols % block != 0 || w.element_count() < p.rows * p.cols {
        return Err(DeviceError::launch(
            kernel,
            format!(
                "'{}' ({} elements) cannot serve a [{}, {}] projection",
                p.weight,
                w.element_count(),
                p.rows,
                p.cols
            ),
        ));
    }
    let bias = p
        .bias
        .map(|b| dense(weights, kernel, b))
        .transpose()?;
    if let Some(b) = bias {
        if b.len() < p.rows {
            return Err(DeviceError::launch(kernel, "bias shorter than the projection"));
        }
    }

    let mut out = mem.take(kernel, p.output)?;
    let x = mem.data(kernel, p.input)?;
    check_len(kernel, p.input, x.len(), p.cols)?;
    check_len(kernel, p.output, out.len(), p.rows)?;

    let (cols, residual) = (p.cols, p.residual);
    out[..p.rows]
        .par_iter_mut()
        .enumerate()
        .for_each(|(r, o)| {
            let mut v = w.dot_row(r, cols, x);
            if let Some(b) = bias {
                v += b[r];
            }
            if residual {
                *o += v;
            } else {
                *o = v;
            }
        });
    mem.put(p.output, out);
    Ok(())
}

fn split_qkv(
    kernel: &str,
    grid: &WorkerGrid,
    mem: &mut DeviceMemory,
    input: StateBuffer,
    outputs: [StateBuffer; 3],
    q_dim: usize,
    kv_dim: usize,
) -> DeviceResult<()> {
    groups_1d(kernel, grid, q_dim + 2 * kv_dim)?;
    let [qb, kb, vb] = outputs;
    let mut q = mem.take(kernel, qb)?;
    let mut k = mem.take(kernel, kb)?;
    let mut v = mem.take(kernel, vb)?;
    let qkv = mem.data(kernel, input)?;
    check_len(kernel, input, qkv.len(), q_dim + 2 * kv_dim)?;
    check_len(kernel, qb, q.len(), q_dim)?;
    check_len(kernel, kb, k.len(), kv_dim)?;
    check_len(kernel, vb, v.len(), kv_dim)?;

    q[..q_dim].copy_from_slice(&qkv[..q_dim]);
    k[..kv_dim].copy_from_slice(&qkv[q_dim..q_dim + kv_dim]);
    v[..kv_dim].copy_from_slice(&qkv[q_dim + kv_dim..q_dim + 2 * kv_dim]);
    mem.put(qb, q);
    mem.put(kb, k);
    mem.put(vb, v);
    Ok(())
}

/// Rotates every head of Q and of K at the resident position.
#[allow(clippy::too_many_arguments)]
fn rope(
    kernel: &str,
    grid: &WorkerGrid,
    mem: &mut DeviceMemory,
    weights: &WeightSet,
    buffers: [StateBuffer; 2],
    tables: [WeightRef; 2],
    heads: [usize; 2],
    head_size: usize,
    style: RopeStyle,
) -> DeviceResult<()> {
    let half = head_size / 2;
    let [n_heads, n_kv_heads] = heads;
    if grid.global() != [n_heads.max(n_kv_heads), half] {
        return Err(DeviceError::launch(
            kernel,
            format!("grid {} does not cover ({}, {})", grid, n_heads.max(n_kv_heads), half),
        ));
    }
    let pos = mem.position(kernel)?;
    let cos = dense(weights, kernel, tables[0])?;
    let sin = dense(weights, kernel, tables[1])?;
    let start = pos * half;
    if start + half > cos.len() || start + half > sin.len() {
        return Err(DeviceError::launch(
            kernel,
            format!("position {} is past the rotary tables", pos),
        ));
    }
    let (cos, sin) = (&cos[start..start + half], &sin[start..start + half]);
    let rotate = |head: &mut [f32]| {
        for i in 0..half {
            rotate_pair(head, i, cos[i], sin[i], style);
        }
    };

    for (b, n) in buffers.into_iter().zip([n_heads, n_kv_heads]) {
        let mut x = mem.take(kernel, b)?;
        check_len(kernel, b, x.len(), n * head_size)?;
        x[..n * head_size].par_chunks_mut(head_size).for_each(|h| rotate(h));
        mem.put(b, x);
    }
    Ok(())
}

fn kv_cache_write(
    kernel: &str,
    grid: &WorkerGrid,
    mem: &mut DeviceMemory,
    pairs: [(StateBuffer, StateBuffer); 2],
    layer: usize,
    kv_dim: usize,
    context_length: usize,
) -> DeviceResult<()> {
    groups_1d(kernel, grid, kv_dim)?;
    let pos = mem.position(kernel)?;
    if pos >= context_length {
        return Err(DeviceError::launch(
            kernel,
            format!("position {} is outside a {}-slot cache", pos, context_length),
        ));
    }
    let offset = (layer * context_length + pos) * kv_dim;
    for (src, cache) in pairs {
        let mut c = mem.take(kernel, cache)?;
        let s = mem.data(kernel, src)?;
        check_len(kernel, src, s.len(), kv_dim)?;
        check_len(kernel, cache, c.len(), offset + kv_dim)?;
        c[offset..offset + kv_dim].copy_from_slice(&s[..kv_dim]);
        mem.put(cache, c);
    }
    Ok(())
}

struct Attend {
    q: StateBuffer,
    key_cache: StateBuffer,
    value_cache: StateBuffer,
    scores: StateBuffer,
    output: StateBuffer,
    layer: usize,
    n_heads: usize,
    n_kv_heads: usize,
    head_size: usize,
    context_length: usize,
}

/// One work-group per query head over cached positions `0..=position`.
fn attention(
    kernel: &str,
    grid: &WorkerGrid,
    mem: &mut DeviceMemory,
    a: Attend,
) -> DeviceResult<()> {
    let (hs, ctx) = (a.head_size, a.context_length);
    if grid.groups()[0] != a.n_heads {
        return Err(DeviceError::launch(
            kernel,
            format!("grid {} does not launch one group per head", grid),
        ));
    }
    if a.n_kv_heads == 0 || a.n_heads % a.n_kv_heads != 0 {
        return Err(DeviceError::launch(kernel, "query heads do not group over kv heads"));
    }
    let pos = mem.position(kernel)?;
    if pos >= ctx {
        return Err(DeviceError::launch(
            kernel,
            format!("position {} is outside a {}-slot cache", pos, ctx),
        ));
    }
    let group = a.n_heads / a.n_kv_heads;
    let kv_dim = a.n_kv_heads * hs;
    let base = a.layer * ctx * kv_dim;
    let scale = 1.0 / (hs as f32).sqrt();

    let mut att = mem.take(kernel, a.scores)?;
    let mut out = mem.take(kernel, a.output)?;
    let q = mem.data(kernel, a.q)?;
    let kc = mem.data(kernel, a.key_cache)?;
    let vc = mem.data(kernel, a.value_cache)?;
    check_len(kernel, a.scores, att.len(), a.n_heads * ctx)?;
    check_len(kernel, a.output, out.len(), a.n_heads * hs)?;
    check_len(kernel, a.q, q.len(), a.n_heads * hs)?;
    check_len(kernel, a.key_cache, kc.len(), base + ctx * kv_dim)?;
    check_len(kernel, a.value_cache, vc.len(), base + ctx * kv_dim)?;

    att[..a.n_heads * ctx]
        .par_chunks_mut(ctx)
        .zip(out[..a.n_heads * hs].par_chunks_mut(hs))
        .enumerate()
        .for_each(|(h, (scores, o))| {
            let qh = &q[h * hs..(h + 1) * hs];
            let head_off = (h / group) * hs;
            for (t, s) in scores[..=pos].iter_mut().enumerate() {
                let off = base + t * kv_dim + head_off;
                *s = dot_f32(qh, &kc[off..off + hs]) * scale;
            }
            softmax(&mut scores[..=pos]);

            o.fill(0.0);
            for (t, &w) in scores[..=pos].iter().enumerate() {
                let off = base + t * kv_dim + head_off;
                for (oi, vi) in o.iter_mut().zip(&vc[off..off + hs]) {
                    *oi += w * vi;
                }
            }
        });
    mem.put(a.scores, att);
    mem.put(a.output, out);
    Ok(())
}

fn softmax(x: &mut [f32]) {
    let max = x.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let mut sum = 0.0;
    for v in x.iter_mut() {
        *v = (*v - max).exp();
        sum += *v;
    }
    for v in x.iter_mut() {
        *v /= sum;
    }
}

fn silu(x: f32) -> f32 {
    x / (1.0 + (-x).exp())
}

fn silu_gate(
    kernel: &str,
    grid: &WorkerGrid,
    mem: &mut DeviceMemory,
    input: SiluInput,
    output: StateBuffer,
    hidden: usize,
) -> DeviceResult<()> {
    let (_, local) = groups_1d(kernel, grid, hidden)?;
    if matches!(input, SiluInput::Separate { up, .. } if up == output) {
        return Err(DeviceError::launch(kernel, "up projection aliases the output"));
    }
    let mut out = mem.take(kernel, output)?;
    check_len(kernel, output, out.len(), hidden)?;

    match input {
        // Gate in place: the output buffer already holds the gate values.
        SiluInput::Separate { gate, up } if gate == output => {
            let u = mem.data(kernel, up)?;
            check_len(kernel, up, u.len(), hidden)?;
            out[..hidden]
                .par_chunks_mut(local)
                .zip(u[..hidden].par_chunks(local))
                .for_each(|(o, u)| {
                    for (oi, ui) in o.iter_mut().zip(u) {
                        *oi = silu(*oi) * ui;
                    }
                });
        }
        SiluInput::Separate { gate, up } => {
            let g = mem.data(kernel, gate)?;
            let u = mem.data(kernel, up)?;
            check_len(kernel, gate, g.len(), hidden)?;
            check_len(kernel, up, u.len(), hidden)?;
            gated(&mut out[..hidden], g, u, local);
        }
        SiluInput::Fused { gate_up } => {
            let gu = mem.data(kernel, gate_up)?;
            check_len(kernel, gate_up, gu.len(), 2 * hidden)?;
            let (g, u) = gu[..2 * hidden].split_at(hidden);
            gated(&mut out[..hidden], g, u, local);
        }
    }
    mem.put(output, out);
    Ok(())
}

fn gated(out: &mut [f32], gate: &[f32], up: &[f32], local: usize) {
    out.par_chunks_mut(local)
        .zip(gate.par_chunks(local))
        .zip(up.par_chunks(local))
        .for_each(|((o, g), u)| {
            for ((oi, gi), ui) in o.iter_mut().zip(g).zip(u) {
                *oi = silu(*gi) * ui;
            }
        });
}
