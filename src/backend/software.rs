//! Software peer generation
//!
//! Globals are visited in name order so both parameter lists are
//! reproducible. Sampler setup runs in register order instead, because the
//! source rectangle of an input can only be queried once its bounds are
//! registered with the peer.

use hashbrown::HashMap;
use itertools::Itertools;

use super::{
    CodeGenerator, CompileOptions, GenCode, component_names,
    lowering::{LoweredBody, SKIP_LABEL, STORE_LABEL, ScalarLowering},
    params::{ParamList, ParamType, SamplerNames},
    peer::{EffectPeerApi, SourceGeometry, SsePeerApi},
    pin::PinLadder,
    template::Template,
};
use crate::{
    context::CompileContext,
    error::{CompileError, CompileResult},
    middle::{
        builtins::SAMPLE_POSITIONS,
        program::ProgramUnit,
        ty::{SamplerKind, Type},
        variable::{Qualifier, Variable},
    },
};

const GLUE_DESTINATION: [&str; 6] = [
    "int[] dstPixels",
    "int dstx",
    "int dsty",
    "int dstw",
    "int dsth",
    "int dstscan",
];
const NATIVE_DESTINATION: [&str; 6] = [
    "jintArray dst_arr",
    "jint dstx",
    "jint dsty",
    "jint dstw",
    "jint dsth",
    "jint dstscan",
];
const CALL_DESTINATION: [&str; 6] = ["dstPixels", "dstx", "dsty", "dstw", "dsth", "dstscan"];

/// How a global reaches the kernel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlobalClass {
    /// Synthesized inside the kernel
    BuiltInConstant,
    /// Inlined wherever it is read
    Literal,
    Scalar(ParamType),
    Vector(ParamType, usize),
    /// Flattened to `count` scalars
    Array { ty: ParamType, count: u32 },
    Sampler(SamplerKind),
}

impl GlobalClass {
    pub fn of(variable: &Variable) -> CompileResult<Self> {
        let class = match (variable.qualifier, variable.ty, variable.array_size) {
            (Qualifier::Const, _, _) if variable.value.is_none() => Some(Self::BuiltInConstant),
            (Qualifier::Const, Type::Value(..), None) => Some(Self::Literal),
            (Qualifier::Param, Type::Value(base, 1), None) => {
                Some(Self::Scalar(ParamType::scalar(base)))
            }
            (Qualifier::Param, Type::Value(base, width), None) => {
                Some(Self::Vector(ParamType::scalar(base), width as usize))
            }
            (Qualifier::Param, Type::Value(base, width), Some(length)) => {
                match ParamType::array(base) {
                    Some(ty) => Some(Self::Array {
                        ty,
                        count: array_count(variable, u32::from(width), length)?,
                    }),
                    None => None,
                }
            }
            (Qualifier::Param, Type::Sampler(kind), None) => Some(Self::Sampler(kind)),
            _ => None,
        };

        class.ok_or_else(|| {
            let array = if variable.is_array() { " array" } else { "" };
            CompileError::generation(
                variable.name.value(),
                format!(
                    "no code generation rule for a {:?} {}{array}",
                    variable.qualifier, variable.ty
                ),
            )
        })
    }
}

/// Number of scalars in a flattened array, which must fit a Java array
fn array_count(variable: &Variable, width: u32, length: u32) -> CompileResult<u32> {
    width
        .checked_mul(length)
        .filter(|&count| count <= i32::MAX as u32)
        .ok_or_else(|| {
            CompileError::generation(
                variable.name.value(),
                format!(
                    "{length} elements of {} do not fit in a Java array",
                    variable.ty
                ),
            )
        })
}

pub struct SoftwareBackend;

impl CodeGenerator for SoftwareBackend {
    fn generate<'ast>(
        &self,
        program: &ProgramUnit<'ast>,
        context: &mut CompileContext<'ast>,
        options: &CompileOptions,
    ) -> CompileResult<GenCode> {
        let body = ScalarLowering::lower_main(program, context)?;

        let mut generator = SoftwareGenerator::new(program, options);
        generator.reserve_kernel_names()?;
        generator.emit_globals()?;
        generator.emit_samplers()?;
        generator.reserve_labels(&body)?;

        tracing::debug!(
            parameters = generator.params.len(),
            pinned = generator.pins.len(),
            samplers = program.samplers().len(),
            "generated software peer"
        );

        generator.render(&body, context)
    }
}

struct SoftwareGenerator<'a, 'ast> {
    program: &'a ProgramUnit<'ast>,
    options: &'a CompileOptions,
    params: ParamList,
    /// C labels live apart from variables, so they are reserved separately
    labels: ParamList,
    pins: PinLadder,
    peer: SsePeerApi,
    param_reads: Vec<String>,
    sampler_setup: Vec<String>,
    image_release: Vec<String>,
    interpolation: Vec<String>,
    row_setup: Vec<String>,
    pixel_advance: Vec<String>,
    row_advance: Vec<String>,
}

impl<'a, 'ast> SoftwareGenerator<'a, 'ast> {
    fn new(program: &'a ProgramUnit<'ast>, options: &'a CompileOptions) -> Self {
        Self {
            program,
            options,
            params: ParamList::new(),
            labels: ParamList::new(),
            pins: PinLadder::with_destination("dst_arr", "dst"),
            peer: SsePeerApi::new(),
            param_reads: Vec::new(),
            sampler_setup: Vec::new(),
            image_release: Vec::new(),
            interpolation: Vec::new(),
            row_setup: Vec::new(),
            pixel_advance: Vec::new(),
            row_advance: Vec::new(),
        }
    }

    /// Claims the scalar names the kernel itself declares
    fn reserve_kernel_names(&mut self) -> CompileResult<()> {
        for variable in self.program.globals.iter().filter(|g| g.span.is_none()) {
            let name = variable.name.value();
            for component in component_names(name, variable.ty.width()) {
                self.params.reserve(name, component)?;
            }
        }

        for sampler in self.program.samplers() {
            let name = sampler.name.value();
            let register = sampler.register.unwrap_or_default();

            for field in ["x", "y"] {
                self.params.reserve(name, format!("inc{register}_{field}"))?;
                if register >= SAMPLE_POSITIONS {
                    self.params.reserve(name, format!("pos{register}_{field}"))?;
                }
            }
        }

        for function in &self.program.functions {
            let ty = function.return_type.ty;
            let name = function.name.symbol.value();
            for component in component_names(&format!("{name}_res"), ty.width()) {
                self.params.reserve(name, component)?;
            }
        }

        Ok(())
    }

    /// Claims every label of the kernel. Labels of the lowered body come
    /// first, so a clash is reported against the pinned buffer
    fn reserve_labels(&mut self, body: &LoweredBody) -> CompileResult<()> {
        for label in [STORE_LABEL, SKIP_LABEL] {
            self.labels.reserve("main", label)?;
        }
        for (function, label) in &body.exit_labels {
            self.labels.reserve(function, label.as_str())?;
        }
        for (buffer, label) in self.pins.labels() {
            self.labels.reserve(buffer, label)?;
        }

        Ok(())
    }

    /// Parameters, glue reads and pins of every global, in name order
    fn emit_globals(&mut self) -> CompileResult<()> {
        for variable in self.program.sorted_globals() {
            let name = variable.name.value();
            let class = GlobalClass::of(variable)?;
            tracing::trace!(name, ?class, "classified global");

            match class {
                GlobalClass::BuiltInConstant | GlobalClass::Literal => {}
                GlobalClass::Scalar(ty) => {
                    self.param_reads
                        .push(format!("{} {name} = {}();", ty.glue(), accessor(name)));
                    self.params.push(name, name, ty)?;
                }
                GlobalClass::Vector(ty, width) => {
                    let holder = format!("{name}_val");
                    self.params.reserve(name, &holder)?;
                    self.param_reads
                        .push(format!("{}[] {holder} = {}();", ty.glue(), accessor(name)));

                    for (index, component) in component_names(name, width).into_iter().enumerate()
                    {
                        self.param_reads
                            .push(format!("{} {component} = {holder}[{index}];", ty.glue()));
                        self.params.push(name, component, ty)?;
                    }
                }
                GlobalClass::Array { ty, count } => {
                    self.emit_array(name, ty, count)?;
                }
                GlobalClass::Sampler(kind) => {
                    let names = SamplerNames::new(name);
                    let (buffer, element) = match kind {
                        SamplerKind::Transformed | SamplerKind::Logical => {
                            (ParamType::IntArray, "jint")
                        }
                        SamplerKind::FloatMap => (ParamType::FloatArray, "jfloat"),
                    };

                    self.params.push(name, &names.buffer, buffer)?;
                    for corner in &names.rect {
                        self.params.push(name, corner, ParamType::Float)?;
                    }
                    for size in [&names.width, &names.height, &names.scan] {
                        self.params.push(name, size, ParamType::Int)?;
                    }

                    self.pins
                        .pin(&format!("{}_arr", names.buffer), &names.buffer, element);
                }
            }
        }

        Ok(())
    }

    /// Copies a buffer accessor into a flat array the kernel can pin
    fn emit_array(&mut self, name: &str, ty: ParamType, count: u32) -> CompileResult<()> {
        let (buffer_type, element_glue) = match ty {
            ParamType::FloatArray => ("FloatBuffer", "float"),
            _ => ("IntBuffer", "int"),
        };
        let holder = format!("{name}_buf");
        self.params.reserve(name, &holder)?;

        self.param_reads.extend([
            format!("{buffer_type} {holder} = {}();", accessor(name)),
            format!("{element_glue}[] {name} = new {element_glue}[{count}];"),
            format!("{holder}.rewind();"),
            format!("{holder}.get({name}, 0, Math.min({count}, {holder}.remaining()));"),
        ]);
        self.params.push(name, name, ty)?;

        if let Some(element) = ty.element() {
            let parameter = format!("{name}_arr");
            self.pins.pin(&parameter, name, element);
        }

        Ok(())
    }

    /// Glue setup and kernel interpolation of every sampler, in register
    /// order
    fn emit_samplers(&mut self) -> CompileResult<()> {
        for sampler in self.program.samplers() {
            let name = sampler.name.value();
            let register = sampler.register.unwrap_or_default();
            let names = SamplerNames::new(name);

            let setup = match sampler.ty.sampler_kind() {
                Some(kind @ (SamplerKind::Transformed | SamplerKind::Logical)) => {
                    self.image_setup(name, register, kind, &names)?
                }
                Some(SamplerKind::FloatMap) => self.float_map_setup(name, register, &names)?,
                None => {
                    return Err(CompileError::generation(
                        name,
                        format!("sampler register assigned to a {}", sampler.ty),
                    ));
                }
            };
            self.sampler_setup.push(setup.join("\n"));

            let [x1, y1, x2, y2] = &names.rect;
            self.interpolation.extend([
                format!("float inc{register}_x = ({x2} - {x1}) / dstw;"),
                format!("float inc{register}_y = ({y2} - {y1}) / dsth;"),
                format!("float pos{register}_y = {y1} + inc{register}_y * 0.5f;"),
            ]);
            self.row_setup
                .push(format!("float pos{register}_x = {x1} + inc{register}_x * 0.5f;"));
            self.pixel_advance
                .push(format!("pos{register}_x += inc{register}_x;"));
            self.row_advance
                .push(format!("pos{register}_y += inc{register}_y;"));
        }

        Ok(())
    }

    fn image_setup(
        &mut self,
        name: &str,
        register: u32,
        kind: SamplerKind,
        names: &SamplerNames,
    ) -> CompileResult<Vec<String>> {
        let image = format!("{name}_img");
        let bounds = format!("{name}_bounds");
        let native_bounds = format!("{name}_nativeBounds");
        let rect = format!("{name}Rect");
        for local in [&image, &bounds, &native_bounds, &rect] {
            self.params.reserve(name, local)?;
        }

        let mut setup = vec![
            format!("HeapImage {image} = (HeapImage)inputs[{register}].getUntransformedImage();"),
            format!("Rectangle {bounds} = inputs[{register}].getUntransformedBounds();"),
            format!("int {} = {image}.getPhysicalWidth();", names.width),
            format!("int {} = {image}.getPhysicalHeight();", names.height),
            format!("int {} = {image}.getScanlineStride();", names.scan),
            format!("int[] {} = {image}.getPixelArray();", names.buffer),
            format!(
                "Rectangle {native_bounds} = new Rectangle(0, 0, {}, {});",
                names.width, names.height
            ),
            self.peer.set_input_bounds(register, &bounds),
            self.peer.set_input_native_bounds(register, &native_bounds),
        ];

        let transform = match kind {
            SamplerKind::Transformed => {
                let transform = format!("{name}_transform");
                self.params.reserve(name, &transform)?;
                setup.push(format!(
                    "BaseTransform {transform} = inputs[{register}].getTransform();"
                ));
                Some(transform)
            }
            SamplerKind::Logical | SamplerKind::FloatMap => None,
        };

        let geometry = SourceGeometry {
            bounds,
            width: names.width.clone(),
            height: names.height.clone(),
        };
        setup.push(format!("float[] {rect} = new float[4];"));
        setup.push(self.peer.texture_coordinates(
            name,
            register,
            &rect,
            &geometry,
            transform.as_deref(),
        )?);
        for (index, corner) in names.rect.iter().enumerate() {
            setup.push(format!("float {corner} = {rect}[{index}];"));
        }

        self.image_release
            .push(format!("inputs[{register}].releaseTransformedImage({image});"));

        Ok(setup)
    }

    fn float_map_setup(
        &mut self,
        name: &str,
        register: u32,
        names: &SamplerNames,
    ) -> CompileResult<Vec<String>> {
        let map = format!("{name}_map");
        self.params.reserve(name, &map)?;

        let mut setup = vec![
            format!("FloatMap {map} = {};", self.peer.sampler_data(register)),
            format!("int {} = {map}.getWidth();", names.width),
            format!("int {} = {map}.getHeight();", names.height),
            format!("int {} = {map}.getWidth();", names.scan),
            format!("float[] {} = {map}.getData();", names.buffer),
        ];
        for (corner, value) in names.rect.iter().zip(["0.0f", "0.0f", "1.0f", "1.0f"]) {
            setup.push(format!("float {corner} = {value};"));
        }

        Ok(setup)
    }

    fn render(&self, body: &LoweredBody, context: &CompileContext<'ast>) -> CompileResult<GenCode> {
        let options = self.options;
        let native_name = format!(
            "Java_{}_{}_filter",
            jni_mangle(&options.package),
            jni_mangle(&options.peer_name)
        );

        let native_lead = " ".repeat("    private static native void filter(".len());
        let glue_slots = HashMap::from_iter([
            ("package", options.package.clone()),
            ("peerName", options.peer_name.clone()),
            ("effectName", options.effect_name.clone()),
            (
                "generics",
                options
                    .generics_name
                    .clone()
                    .unwrap_or_else(|| "RenderState".to_owned()),
            ),
            (
                "interfaceDecl",
                options
                    .interface_name
                    .as_ref()
                    .map(|i| format!(" implements {i}"))
                    .unwrap_or_default(),
            ),
            ("glueCode", context.glue_code()),
            ("paramReads", self.param_reads.join("\n")),
            ("samplerSetup", self.sampler_setup.join("\n\n")),
            ("imageRelease", self.image_release.join("\n")),
            (
                "arguments",
                ParamList::layout(&CALL_DESTINATION, self.params.glue_arguments(), ", "),
            ),
            (
                "formals",
                ParamList::layout(
                    &GLUE_DESTINATION,
                    self.params.glue_formals(),
                    &format!(",\n{native_lead}"),
                ),
            ),
            ("bodyComment", doc_comment(&body.text)),
        ]);

        let label = |used: bool, name: &str| {
            if used {
                format!("{name}: ;")
            } else {
                String::new()
            }
        };
        let native_slots = HashMap::from_iter([
            ("functionName", native_name),
            (
                "formals",
                ParamList::layout(&NATIVE_DESTINATION, self.params.native_formals(), ",\n    "),
            ),
            ("pinAcquire", self.pins.acquire()),
            ("interpolationSetup", self.interpolation.join("\n")),
            ("rowSetup", self.row_setup.join("\n")),
            ("body", body.text.clone()),
            ("storeLabel", label(body.uses_store_label, STORE_LABEL)),
            ("skipLabel", label(body.uses_skip_label, SKIP_LABEL)),
            ("pixelAdvance", self.pixel_advance.join("\n")),
            ("rowAdvance", self.row_advance.join("\n")),
            ("pinRelease", self.pins.release()),
        ]);

        Ok(GenCode {
            glue: Template::GLUE.render(&glue_slots)?,
            native: Template::NATIVE.render(&native_slots)?,
        })
    }
}

/// `amount` is read through `getAmount()`
fn accessor(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => format!("get{}{}", first.to_ascii_uppercase(), chars.as_str()),
        None => "get".to_owned(),
    }
}

/// Escapes a Java package or class name for a JNI symbol
pub fn jni_mangle(name: &str) -> String {
    let mut mangled = String::with_capacity(name.len());

    for c in name.chars() {
        match c {
            '.' | '/' => mangled.push('_'),
            '_' => mangled.push_str("_1"),
            ';' => mangled.push_str("_2"),
            '[' => mangled.push_str("_3"),
            c if c.is_ascii_alphanumeric() => mangled.push(c),
            c => {
                let mut units = [0u16; 2];
                for unit in c.encode_utf16(&mut units) {
                    mangled.push_str(&format!("_0{unit:04x}"));
                }
            }
        }
    }

    mangled
}

/// Lowered body as the lines of a Javadoc `<pre>` block
fn doc_comment(body: &str) -> String {
    body.lines()
        .map(|line| match line {
            "" => "*".to_owned(),
            line => format!("* {}", line.replace("*/", "*&#47;")),
        })
        .join("\n")
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;
    use crate::{
        frontend::{SourceFile, parser::Parser},
        middle::resolve::SymbolResolver,
    };

    fn generate(text: &str) -> CompileResult<GenCode> {
        let source = SourceFile::from_memory(text);
        let module = Parser::parse_module(&source)?;
        let mut context = CompileContext::new();
        let program = SymbolResolver::resolve(&module, &mut context)?;

        SoftwareBackend.generate(
            &program,
            &mut context,
            &CompileOptions::new("Brightness", "SSEBrightnessPeer"),
        )
    }

    #[test]
    fn classifies_every_kind_of_global() {
        let param = |ty, array_size| Variable {
            qualifier: Qualifier::Param,
            array_size,
            ..Variable::built_in("v", ty, Qualifier::Param)
        };

        assert_eq!(
            GlobalClass::of(&param(Type::FLOAT3, None)).unwrap(),
            GlobalClass::Vector(ParamType::Float, 3)
        );
        assert_eq!(
            GlobalClass::of(&param(Type::INT2, Some(4))).unwrap(),
            GlobalClass::Array {
                ty: ParamType::IntArray,
                count: 8
            }
        );
        assert_eq!(
            GlobalClass::of(&param(Type::LOGICAL_SAMPLER, None)).unwrap(),
            GlobalClass::Sampler(SamplerKind::Logical)
        );
        assert_eq!(
            GlobalClass::of(&Variable::built_in("pos0", Type::FLOAT2, Qualifier::Const)).unwrap(),
            GlobalClass::BuiltInConstant
        );
    }

    #[test]
    fn unsupported_globals_name_the_variable() {
        let flags = Variable {
            array_size: Some(4),
            ..Variable::built_in("flags", Type::BOOL, Qualifier::Param)
        };

        let error = GlobalClass::of(&flags).unwrap_err();
        assert_eq!(
            error.to_string(),
            "generation error: variable `flags`: no code generation rule for a Param bool array"
        );
    }

    #[test]
    fn colliding_generated_names_are_generation_errors() {
        let error = generate(indoc! {"
            param sampler src;
            param float srcW;
            void main() { color = sample(src, pos0); }
        "})
        .unwrap_err();

        assert!(matches!(error, CompileError::Generation { ref variable, .. } if variable == "srcW"));
    }

    #[test]
    fn arrays_past_the_java_limit_are_rejected() {
        for declaration in ["param float4 w[1073741824];", "param float w[4294967295];"] {
            let error =
                generate(&format!("{declaration}\nvoid main() {{ color = float4(1.0); }}"))
                    .unwrap_err();

            assert!(
                matches!(error, CompileError::Generation { ref variable, .. } if variable == "w"),
                "{error}"
            );
            assert!(error.to_string().contains("do not fit in a Java array"), "{error}");
        }

        let largest =
            generate("param int w[2147483647];\nvoid main() { color = float4(1.0); }").unwrap();
        assert!(largest.glue.contains("int[] w = new int[2147483647];"));
    }

    #[test]
    fn pin_labels_may_not_clash_with_inlined_exits() {
        let error = generate(indoc! {"
            param float foo_exit_0[2];
            param float zz[2];
            float release_foo(float a) { return a; }
            void main() { color = float4(release_foo(foo_exit_0[0] + zz[0])); }
        "})
        .unwrap_err();

        assert!(
            matches!(error, CompileError::Generation { ref variable, .. } if variable == "foo_exit_0"),
            "{error}"
        );
        assert!(error.to_string().contains("`release_foo_exit_0`"), "{error}");

        let renamed = generate(indoc! {"
            param float foo_exit_0[2];
            param float zz[2];
            float release_bar(float a) { return a; }
            void main() { color = float4(release_bar(foo_exit_0[0] + zz[0])); }
        "})
        .unwrap();
        assert_eq!(renamed.native.matches("release_foo_exit_0:").count(), 1);
        assert_eq!(renamed.native.matches("release_bar_exit_0: ;").count(), 1);
    }

    #[test]
    fn mangles_jni_names() {
        assert_eq!(jni_mangle("com.example.fx_effects"), "com_example_fx_1effects");
        assert_eq!(jni_mangle("SSE_Peer"), "SSE_1Peer");
    }

    #[test]
    fn reads_vectors_and_arrays_through_accessors() {
        let code = generate(indoc! {"
            param float2 offset;
            param float weights[3];
            void main() { color = float4(offset, weights[0], 1.0); }
        "})
        .unwrap();

        assert!(code.glue.contains("float[] offset_val = getOffset();"));
        assert!(code.glue.contains("float offset_y = offset_val[1];"));
        assert!(code.glue.contains("FloatBuffer weights_buf = getWeights();"));
        assert!(code.glue.contains("float[] weights = new float[3];"));
        assert!(code.native.contains("jfloatArray weights_arr"));
        assert!(code.native.contains(
            "jfloat *weights = (jfloat *)(*env)->GetPrimitiveArrayCritical(env, weights_arr, 0);"
        ));
    }

    #[test]
    fn sampler_setup_follows_register_order() {
        let code = generate(indoc! {"
            param sampler zsrc;
            param sampler asrc;
            void main() { color = sample(zsrc, pos0) + sample(asrc, pos1); }
        "})
        .unwrap();

        let first = code.glue.find("inputs[0].getUntransformedImage()").unwrap();
        let second = code.glue.find("inputs[1].getUntransformedImage()").unwrap();
        assert!(code.glue[first..second].contains("zsrc_img"));

        let asrc = code.glue.find("int[] asrc,").unwrap();
        let zsrc = code.glue.find("int[] zsrc,").unwrap();
        assert!(asrc < zsrc);
    }

    #[test]
    fn places_kernel_labels_only_when_used() {
        let plain = generate("void main() { color = float4(1.0); }").unwrap();
        assert!(!plain.native.contains(STORE_LABEL));
        assert!(!plain.native.contains(SKIP_LABEL));

        let discarding = generate(indoc! {"
            param float amount;
            void main() {
                if (amount < 0.5) discard;
                color = float4(amount);
            }
        "})
        .unwrap();
        assert!(discarding.native.contains("skip_pixel: ;"));
        assert!(!discarding.native.contains("store_pixel: ;"));
    }
}
