// Copyright (c) 2025 Hemashushu <hippospark@gmail.com>, All rights reserved.
//
// This Source Code Form is subject to the terms of
// the Mozilla Public License version 2.0 and additional exceptions.
// For more details, see the LICENSE, LICENSE.additional, and CONTRIBUTING files.

// The M-Code instruction set.
//
// An instruction is one opcode byte followed by zero or more operand
// bytes. The operand width is fixed per opcode:
//
// - (none)          no operand
// - (param b:u8)    one immediate byte
// - (param w:u16)   one immediate word, big-endian in the code frame
// - (param a:u8 b:u8)
// - (param v:u16 w:u16)
// - (param b:u8 w:u16)
//
// Opcode values are given in octal, the notation every M-Code listing
// uses. The short-form families (LI0..LI15, LLW4..LLW15, CLL1..CLL15,
// and so on) encode their operand in the low bits of the opcode itself.

#[repr(u8)]
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[allow(non_camel_case_types)]
#[allow(clippy::upper_case_acronyms)]
pub enum Opcode {
    //
    // immediate loads
    //

    LI0 = 0o000, // push 0
    LI1,         // push 1
    LI2,
    LI3,
    LI4,
    LI5,
    LI6,
    LI7,
    LI8,
    LI9,
    LI10,
    LI11,
    LI12,
    LI13,
    LI14,
    LI15,

    LIB = 0o020, // push immediate byte          (param b:u8)
    LIW = 0o022, // push immediate word          (param w:u16)
    LID = 0o023, // push immediate doubleword    (param hi:u16 lo:u16)

    //
    // address computation
    //

    LLA = 0o024, // push L+n, local address      (param n:u8)
    LGA = 0o025, // push G+n, global address     (param n:u8)
    LSA = 0o026, // pop a, push a+n              (param n:u8)
    LEA = 0o027, // push external address        (param m:u8 a:u8)

    //
    // jumps
    //
    // displacements are counted from the end of the whole instruction;
    // the conditional forms pop the condition and jump when it is FALSE,
    // ORJP/ANDJP implement short-circuit evaluation.
    //

    JPC = 0o030,   // conditional jump             (param disp:u16, signed)
    JP = 0o031,    // jump                         (param disp:u16, signed)
    JPFC = 0o032,  // conditional jump forward     (param disp:u8)
    JPF = 0o033,   // jump forward                 (param disp:u8)
    JPBC = 0o034,  // conditional jump backward    (param disp:u8)
    JPB = 0o035,   // jump backward                (param disp:u8)
    ORJP = 0o036,  // short-circuit OR             (param disp:u8)
    ANDJP = 0o037, // short-circuit AND            (param disp:u8)

    //
    // local and external frame loads
    //

    LLW = 0o040, // push DSH[L+n]                (param n:u8)
    LLD = 0o041, // push doubleword at L+n       (param n:u8)
    LEW = 0o042, // push external word           (param m:u8 n:u8)
    LED = 0o043, // push external doubleword     (param m:u8 n:u8)
    LLW4 = 0o044,
    LLW5,
    LLW6,
    LLW7,
    LLW8,
    LLW9,
    LLW10,
    LLW11,
    LLW12,
    LLW13,
    LLW14,
    LLW15,

    //
    // local and external frame stores
    //

    SLW = 0o060, // pop into DSH[L+n]            (param n:u8)
    SLD = 0o061, // pop doubleword into L+n      (param n:u8)
    SEW = 0o062, // pop into external word       (param m:u8 n:u8)
    SED = 0o063, // pop doubleword, external     (param m:u8 n:u8)
    SLW4 = 0o064,
    SLW5,
    SLW6,
    SLW7,
    SLW8,
    SLW9,
    SLW10,
    SLW11,
    SLW12,
    SLW13,
    SLW14,
    SLW15,

    //
    // global frame loads and stores
    //

    LGW = 0o100, // push DSH[G+n]                (param n:u8)
    LGD = 0o101, // push doubleword at G+n       (param n:u8)
    LGW2 = 0o102,
    LGW3,
    LGW4,
    LGW5,
    LGW6,
    LGW7,
    LGW8,
    LGW9,
    LGW10,
    LGW11,
    LGW12,
    LGW13,
    LGW14,
    LGW15,

    SGW = 0o120, // pop into DSH[G+n]            (param n:u8)
    SGD = 0o121, // pop doubleword into G+n      (param n:u8)
    SGW2 = 0o122,
    SGW3,
    SGW4,
    SGW5,
    SGW6,
    SGW7,
    SGW8,
    SGW9,
    SGW10,
    SGW11,
    SGW12,
    SGW13,
    SGW14,
    SGW15,

    //
    // stack-indirect short forms: pop an address, access DSH[a+n]
    //

    LSW0 = 0o140,
    LSW1,
    LSW2,
    LSW3,
    LSW4,
    LSW5,
    LSW6,
    LSW7,
    LSW8,
    LSW9,
    LSW10,
    LSW11,
    LSW12,
    LSW13,
    LSW14,
    LSW15,

    SSW0 = 0o160,
    SSW1,
    SSW2,
    SSW3,
    SSW4,
    SSW5,
    SSW6,
    SSW7,
    SSW8,
    SSW9,
    SSW10,
    SSW11,
    SSW12,
    SSW13,
    SSW14,
    SSW15,

    //
    // stack-indexed loads
    //

    LSW = 0o200,  // pop a, push DSH[a+n]        (param n:u8)
    LSD = 0o201,  // pop a, push doubleword      (param n:u8)
    LSD0 = 0o202, // pop a, push doubleword at a
    LXFW = 0o203, // load indexed frame word (halt on use)
    LSTA = 0o204, // push string address G+w     (param w:u16)
    LXB = 0o205,  // pop i, pop a, push byte i of DSH[a..]
    LXW = 0o206,  // pop i, pop a, push DSH[a+i]
    LXD = 0o207,  // pop i, pop a, push doubleword at a+2i

    //
    // doubleword (32-bit) integer arithmetic
    //

    DADD = 0o210,
    DSUB,
    DMUL,
    DDIV,
    DSHL = 0o216, // pop n, pop doubleword, shift left
    DSHR = 0o217, // pop n, pop doubleword, shift right

    //
    // stack-indexed stores
    //

    SSW = 0o220,  // pop v, pop a, DSH[a+n] := v (param n:u8)
    SSD = 0o221,  // pop doubleword, pop a       (param n:u8)
    SSD0 = 0o222, // pop doubleword, pop a, store at a
    SXFW = 0o223, // store indexed frame word (halt on use)
    TS = 0o224,   // pop a, push DSH[a], DSH[a] := 1 (test-and-set)
    SXB = 0o225,  // pop v, pop i, pop a, store byte i of DSH[a..]
    SXW = 0o226,  // pop v, pop i, pop a, DSH[a+i] := v
    SXD = 0o227,  // pop doubleword, pop i, pop a, store at a+2i

    //
    // floating point (IEEE-754 single with the historical exponent bias:
    // guest bit patterns read as host floats carry a factor of 4)
    //

    FADD = 0o230,
    FSUB,
    FMUL,
    FDIV,
    FCMP, // pop b, pop a, push 0xffff/0/1 for a<b / a=b / a>b
    FABS,
    FNEG,
    FFCT = 0o237, // float function: 0 = INTEGER->REAL, 1 = REAL->INTEGER (param f:u8)

    //
    // hardware channels, checks, supervisor
    //

    READ = 0o240,  // pop a, pop ch, DSH[a] := channel ch
    WRITE = 0o241, // pop v, pop ch, write v to channel ch
    DSKR = 0o242,  // disk read (no disk: system trap)
    DSKW = 0o243,  // disk write (no disk: system trap)
    SETRK = 0o244, // disk seek (no disk: system trap)
    UCHK = 0o245,  // pop hi, pop lo, pop v, unsigned range check, push v
    SVC = 0o246,   // supervisor call                  (param sub:u8)
    SYS = 0o247,   // system call                      (param sub:u8)

    //
    // priority, unsigned comparison, process transfer
    //

    ENTP = 0o250, // save M in the frame, M := n      (param n:u8)
    EXP = 0o251,  // restore M from the frame
    ULSS = 0o252,
    ULEQ,
    UGTR,
    UGEQ,
    TRA = 0o256, // coroutine transfer (halt on use)
    RDS = 0o257, // read string from the keyboard     (param n:u8)

    //
    // expression-stack spill machinery
    //

    STORE = 0o260, // spill the expression stack to the procedure stack
    LODFW = 0o261, // pop result, restore spill, push result
    LODFD = 0o262, // doubleword variant of LODFW
    STOT = 0o263,  // pop one word onto the procedure stack
    STOFV = 0o264, // pop one doubleword onto the procedure stack
    COPT = 0o265,  // duplicate the top word
    DECS = 0o266,  // drop the top word
    PCOP = 0o267,  // copy a value parameter onto the stack (param n:u8)

    //
    // unsigned 16-bit arithmetic and shifts
    //

    UADD = 0o270, // traps on carry
    USUB,         // traps on borrow
    UMUL,         // traps on overflow
    UDIV,
    UMOD,
    ROR = 0o275, // pop n, pop v, rotate right
    SHL = 0o276, // pop n, pop v, shift left
    SHR = 0o277, // pop n, pop v, shift right

    //
    // FOR and CASE control
    //

    FOR1 = 0o300, // enter FOR                        (param sign:u8 skip:u16)
    FOR2 = 0o301, // end FOR                          (param step:u8 back:u16)
    ENTC = 0o302, // enter CASE                       (param tab:u16)
    EXC = 0o303,  // exit CASE
    TRAP = 0o304, // pop trap number, raise it
    CHK = 0o305,  // pop hi, pop lo, pop v, signed range check, push v
    CHKZ = 0o306, // pop hi, pop v, check 0 <= v <= hi, push v
    CHKS = 0o307, // pop v, trap if negative, push v

    //
    // signed comparison, sign operations
    //

    EQL = 0o310,
    NEQ,
    LSS,
    LEQ,
    GTR,
    GEQ,
    ABS = 0o316,
    NEG = 0o317,

    //
    // bitwise and set operations
    //

    OR = 0o320,
    XOR,
    AND,
    COM = 0o323, // ones complement
    IN = 0o324,  // pop set, pop i, push bit i of set
    LIN = 0o325, // pop set, push bit n of set       (param n:u8)
    MSK = 0o326, // pop i, push mask of the low i bits
    NOT = 0o327, // boolean negation

    //
    // signed 16-bit arithmetic
    //

    IADD = 0o330, // traps on overflow
    ISUB,         // traps on overflow
    IMUL,         // traps on overflow
    IDIV,
    IMOD,
    BIT = 0o335, // pop i, push 1<<i

    NOP = 0o336,
    MOVF = 0o337, // move across frames (halt on use)

    //
    // block operations
    //

    MOV = 0o340,  // pop k, pop j, pop i, copy k words DSH[j..] -> DSH[i..]
    CMP = 0o341,  // pop k, pop j, pop i, push first differing word pair
    DDT = 0o342,  // display dot (no bitmap: halt on use)
    REPL = 0o343, // replicate pattern (no bitmap: halt on use)
    BBLT = 0o344, // bit block transfer (no bitmap: halt on use)
    DCH = 0o345,  // pop ch, pop two position words, emit character
    UNPK = 0o346, // pop n, pop i, pop w, push bits i..i+n-1 right-justified
    PACK = 0o347, // pop v, pop n, pop i, pop a, insert low n bits of v at i

    //
    // procedure calls
    //

    GB = 0o350,    // follow the static chain n levels (param n:u8)
    GB1 = 0o351,   // push DSH[L+1], one static level
    ALLOC = 0o352, // pop n, push S, S := S+n
    ENTR = 0o353,  // S := S+n, enter frame            (param n:u8)
    RTN = 0o354,   // return
    CLX = 0o355,   // external call                    (param m:u8 p:u8)
    CLI = 0o356,   // pop base, intermediate-level call (param p:u8)
    CLF = 0o357,   // formal call, pop descriptor {m:hi, p:lo}
    CLL = 0o360,   // local call                       (param p:u8)
    CLL1 = 0o361,
    CLL2,
    CLL3,
    CLL4,
    CLL5,
    CLL6,
    CLL7,
    CLL8,
    CLL9,
    CLL10,
    CLL11,
    CLL12,
    CLL13,
    CLL14,
    CLL15,
}
