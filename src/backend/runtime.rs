//! Built-in runtime emitted into every module.
//!
//! Implements `input` (read a decimal integer from stdin) and `output`
//! (write a decimal integer plus newline to stdout) on top of the raw
//! read/write syscalls, with `atoi`/`itoa` helpers. Both handle a leading
//! `-`. The I/O buffers live in the `.data` section emitted by the
//! module footer.

/// Append the runtime functions to the output.
pub fn emit_runtime(out: &mut String) {
    let emit = |out: &mut String, line: &str| {
        if line.ends_with(':') || line.is_empty() {
            out.push_str(line);
        } else {
            out.push_str("    ");
            out.push_str(line);
        }
        out.push('\n');
    };

    let lines = [
        "# Built-in I/O runtime",
        "input:",
        "push rbp",
        "mov rbp, rsp",
        "mov rax, 0", // sys_read
        "mov rdi, 0", // stdin
        "lea rsi, input_buffer",
        "mov rdx, 32",
        "syscall",
        "lea rdi, input_buffer",
        "call atoi",
        "mov rsp, rbp",
        "pop rbp",
        "ret",
        "",
        "output:",
        "push rbp",
        "mov rbp, rsp",
        "mov rdi, [rbp + 16]", // the pushed argument
        "lea rsi, output_buffer",
        "call itoa",
        "mov rdx, rax", // length from itoa
        "mov rax, 1",   // sys_write
        "mov rdi, 1",   // stdout
        "lea rsi, output_buffer",
        "syscall",
        "mov rsp, rbp",
        "pop rbp",
        "ret",
        "",
        "# atoi: rdi = buffer, returns value in rax",
        "atoi:",
        "push rbp",
        "mov rbp, rsp",
        "xor rax, rax",
        "xor rcx, rcx",
        "xor r9, r9", // sign flag
        "movzx rdx, byte ptr [rdi]",
        "cmp rdx, 45", // '-'
        "jne atoi_loop",
        "mov r9, 1",
        "inc rcx",
        "atoi_loop:",
        "movzx rdx, byte ptr [rdi + rcx]",
        "cmp rdx, 48", // below '0'
        "jl atoi_done",
        "cmp rdx, 57", // above '9'
        "jg atoi_done",
        "sub rdx, 48",
        "imul rax, 10",
        "add rax, rdx",
        "inc rcx",
        "jmp atoi_loop",
        "atoi_done:",
        "test r9, r9",
        "jz atoi_ret",
        "neg rax",
        "atoi_ret:",
        "pop rbp",
        "ret",
        "",
        "# itoa: rdi = value, rsi = buffer, returns length in rax",
        "itoa:",
        "push rbp",
        "mov rbp, rsp",
        "push rbx",
        "mov rax, rdi",
        "mov rbx, 10",
        "xor rcx, rcx", // digit count
        "xor r9, r9",   // sign flag
        "test rax, rax",
        "jns itoa_digits",
        "mov r9, 1",
        "neg rax",
        "itoa_digits:",
        "xor rdx, rdx",
        "div rbx",
        "add rdx, 48",
        "mov [rsi + rcx], dl",
        "inc rcx",
        "test rax, rax",
        "jnz itoa_digits",
        "test r9, r9",
        "jz itoa_reverse",
        "mov byte ptr [rsi + rcx], 45", // '-'
        "inc rcx",
        // Digits were produced least significant first; reverse in place.
        "itoa_reverse:",
        "mov rdi, rsi",
        "lea rdx, [rsi + rcx - 1]",
        "itoa_reverse_loop:",
        "cmp rdi, rdx",
        "jge itoa_reverse_done",
        "mov al, [rdi]",
        "mov bl, [rdx]",
        "mov [rdi], bl",
        "mov [rdx], al",
        "inc rdi",
        "dec rdx",
        "jmp itoa_reverse_loop",
        "itoa_reverse_done:",
        "mov byte ptr [rsi + rcx], 10", // trailing newline
        "inc rcx",
        "mov rax, rcx",
        "pop rbx",
        "pop rbp",
        "ret",
    ];
    for line in lines {
        emit(out, line);
    }
}

/// Append the `.data` section with the fixed-size I/O buffers.
pub fn emit_data_section(out: &mut String) {
    out.push_str(".section .data\n");
    out.push_str("input_buffer: .space 32\n");
    out.push_str("output_buffer: .space 32\n");
}
