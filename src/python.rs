use crate::block::Block;
use crate::generator::{
    comparison_operator, is_identifier, plus_one, quote_single, Emitter, Language, Order,
    RuleRegistry,
};
use crate::mutator::{ConditionalShape, ELSE_SOCKET};

pub mod order {
    use crate::generator::Order;

    pub const ATOMIC: Order = Order(0);
    pub const FUNCTION_CALL: Order = Order(22);
    pub const UNARY_SIGN: Order = Order(40);
    pub const ADDITIVE: Order = Order(60);
    pub const BITWISE_OR: Order = Order(100);
    pub const RELATIONAL: Order = Order(110);
    pub const LOGICAL_NOT: Order = Order(120);
    pub const LOGICAL_AND: Order = Order(130);
    pub const LOGICAL_OR: Order = Order(140);
    pub const NONE: Order = Order(990);
}

pub const LANGUAGE: Language = Language {
    name: "python",
    indent: "    ",
    true_literal: "True",
    false_literal: "False",
    comment_prefix: "#",
    statement_terminator: "",
    noop_statement: "pass",
};

pub const PROGRAM_HEADER: &str = "from ottomotor import OttoMotor\nmotor = OttoMotor(14, 13)\n\n";

pub fn registry() -> RuleRegistry {
    let mut r = RuleRegistry::new(LANGUAGE);
    r.statement("ottobit_start", start)
        .statement("ottobit_move_forward", move_forward)
        .statement("ottobit_rotate", rotate)
        .statement("ottobit_move_backward", |_, _| "robot.move_backward()\n".to_string())
        .statement("ottobit_turn_left", |_, _| "robot.turn_left()\n".to_string())
        .statement("ottobit_turn_right", |_, _| "robot.turn_right()\n".to_string())
        .statement("ottobit_walk", walk)
        .statement("ottobit_dance", dance)
        .statement("ottobit_wait", wait)
        .statement("ottobit_repeat", repeat)
        .statement("ottobit_repeat_range", repeat_range)
        .statement("ottobit_while", while_loop)
        .statement("ottobit_while_compare", while_compare)
        .statement("ottobit_if", if_then)
        .statement("ottobit_if_condition", if_then)
        .statement("ottobit_if_else", if_else)
        .statement("ottobit_if_elseif_else", if_elseif_else)
        .statement("ottobit_if_expandable", if_expandable)
        .statement("ottobit_led_on", led_on)
        .statement("ottobit_led_off", |_, _| "robot.led_off()\n".to_string())
        .statement("ottobit_buzzer_beep", buzzer_beep)
        .statement("ottobit_speak", speak)
        .statement("ottobit_display_text", display_text)
        .statement("ottobit_send_message", send_message)
        .statement("ottobit_collect_green", |e, b| collect(e, b, "green"))
        .statement("ottobit_collect_red", |e, b| collect(e, b, "red"))
        .statement("ottobit_collect_yellow", |e, b| collect(e, b, "yellow"))
        .statement("ottobit_take_bale", |_, _| "takeBall()\n".to_string())
        .statement("ottobit_put_bale", |_, _| "putBall()\n".to_string())
        .statement("ottobit_function_def", function_def)
        .statement("ottobit_function_call", function_call)
        .expression("ottobit_number", number)
        .expression("ottobit_boolean", boolean)
        .expression("ottobit_variable", variable)
        .expression("ottobit_variable_i", variable)
        .expression("ottobit_read_sensor", read_sensor)
        .expression("ottobit_comparison", comparison)
        .expression("ottobit_logic_compare", logic_compare)
        .expression("ottobit_logic_operation", logic_operation)
        .expression("ottobit_logic_not", logic_not)
        .expression("ottobit_boolean_equals", boolean_equals)
        .expression("ottobit_condition", condition)
        .expression("ottobit_sensor_condition", sensor_condition)
        .expression("ottobit_touch_sensor", |_, _| call("robot.get_touch_sensor()"))
        .expression("ottobit_light_sensor", |_, _| call("robot.get_light_level()"))
        .expression("ottobit_sound_sensor", |_, _| call("robot.get_sound_level()"))
        .expression("ottobit_bale_number", |_, _| call("getBaleNumber()"))
        .expression("ottobit_pin_number", |_, _| call("getPinNumber()"))
        .expression("ottobit_is_green", |_, _| call("isGreen()"))
        .expression("ottobit_is_red", |_, _| call("isRed()"))
        .expression("ottobit_is_yellow", |_, _| call("isYellow()"))
        .alias_prefix("ottobot_", "ottobit_");
    r
}

/// Rules for the body of the firmware's `user_route`. Movement goes through the
/// firmware helpers that track the robot's grid cell, and sensors are read
/// through the firmware's `robot` object.
pub fn routine_registry() -> RuleRegistry {
    let mut r = registry();
    r.statement("ottobit_move_forward", routine_forward)
        .statement("ottobit_rotate", routine_rotate)
        .statement("ottobit_move_backward", |_, _| {
            "turnBack()\nforward(1)\nturnBack()\n".to_string()
        })
        .statement("ottobit_turn_left", |_, _| "turnLeft()\n".to_string())
        .statement("ottobit_turn_right", |_, _| "turnRight()\n".to_string())
        .expression("ottobit_read_sensor", |_, b| read_sensor_from(b, "robot"))
        .expression("ottobit_sensor_condition", |_, b| sensor_condition_from(b, "robot"));
    r
}

fn call(code: &str) -> (String, Order) {
    (code.to_string(), order::FUNCTION_CALL)
}

/// Indented body, or `pass` when nothing would be emitted.
fn suite(e: &mut Emitter<'_>, block: &Block, socket: &str) -> String {
    let code = e.statement_to_code(block, socket);
    if code.trim().is_empty() {
        format!("{}pass\n", LANGUAGE.indent)
    } else {
        code
    }
}

fn start(_e: &mut Emitter<'_>, _block: &Block) -> String {
    PROGRAM_HEADER.to_string()
}

fn move_forward(e: &mut Emitter<'_>, block: &Block) -> String {
    let steps = e.arg(block, "STEPS", order::NONE, "1");
    format!("motor.Move({}, 1, 2)\n", steps)
}

fn rotate(_e: &mut Emitter<'_>, block: &Block) -> String {
    let dir = match block.field_or("DIRECTION", "RIGHT").as_str() {
        "RIGHT" => "1",
        _ => "-1",
    };
    format!("motor.Rotate({})\n", dir)
}

fn routine_forward(e: &mut Emitter<'_>, block: &Block) -> String {
    let steps = e.arg(block, "STEPS", order::NONE, "1");
    format!("forward({})\n", steps)
}

fn routine_rotate(_e: &mut Emitter<'_>, block: &Block) -> String {
    match block.field_or("DIRECTION", "RIGHT").as_str() {
        "LEFT" => "turnLeft()\n",
        "BACK" => "turnBack()\n",
        _ => "turnRight()\n",
    }
    .to_string()
}

fn walk(e: &mut Emitter<'_>, block: &Block) -> String {
    let steps = e.arg(block, "STEPS", order::NONE, "3");
    format!("robot.walk({})\n", steps)
}

fn dance(_e: &mut Emitter<'_>, block: &Block) -> String {
    let pattern = block.field_or("PATTERN", "basic");
    format!("robot.dance({})\n", quote_single(&pattern))
}

fn wait(e: &mut Emitter<'_>, block: &Block) -> String {
    let duration = e.arg(block, "DURATION", order::NONE, "1");
    format!("robot.wait({})\n", duration)
}

fn repeat(e: &mut Emitter<'_>, block: &Block) -> String {
    let times = e.arg(block, "TIMES", order::NONE, "3");
    let var = e.fresh_loop_var("count");
    let body = suite(e, block, "DO");
    format!("for {} in range(int({})):\n{}", var, times, body)
}

fn loop_var(e: &mut Emitter<'_>, block: &Block) -> String {
    let name = e.arg(block, "VAR", order::ATOMIC, "i");
    if is_identifier(name.trim()) {
        name.trim().to_string()
    } else {
        "i".to_string()
    }
}

fn repeat_range(e: &mut Emitter<'_>, block: &Block) -> String {
    let var = loop_var(e, block);
    let from = e.arg(block, "FROM", order::NONE, "1");
    let to = e.arg(block, "TO", order::ADDITIVE, "5");
    let by = e.arg(block, "BY", order::NONE, "1");
    let body = suite(e, block, "DO");
    format!(
        "for {} in range({}, {}, {}):\n{}",
        var,
        from,
        plus_one(&to),
        by,
        body
    )
}

fn while_loop(e: &mut Emitter<'_>, block: &Block) -> String {
    let condition = e.condition(block, "CONDITION");
    let body = suite(e, block, "DO");
    format!("while {}:\n{}", condition, body)
}

fn while_compare(e: &mut Emitter<'_>, block: &Block) -> String {
    let (test, _) = compare_sockets(e, block, "LEFT", "OPERATOR", "RIGHT");
    let body = suite(e, block, "DO");
    format!("while {}:\n{}", test, body)
}

fn if_then(e: &mut Emitter<'_>, block: &Block) -> String {
    let condition = e.condition(block, "CONDITION");
    let body = suite(e, block, "DO");
    format!("if {}:\n{}", condition, body)
}

fn if_else(e: &mut Emitter<'_>, block: &Block) -> String {
    let condition = e.condition(block, "CONDITION");
    let then_body = suite(e, block, "DO");
    let else_body = suite(e, block, ELSE_SOCKET);
    format!("if {}:\n{}else:\n{}", condition, then_body, else_body)
}

fn if_elseif_else(e: &mut Emitter<'_>, block: &Block) -> String {
    let first = e.condition(block, "CONDITION1");
    let first_body = suite(e, block, "DO1");
    let second = e.condition(block, "CONDITION2");
    let second_body = suite(e, block, "DO2");
    let else_body = suite(e, block, ELSE_SOCKET);
    format!(
        "if {}:\n{}elif {}:\n{}else:\n{}",
        first, first_body, second, second_body, else_body
    )
}

fn if_expandable(e: &mut Emitter<'_>, block: &Block) -> String {
    let shape = ConditionalShape::of(block);
    let mut code = String::new();
    for i in 0..shape.pair_count() {
        let keyword = if i == 0 { "if" } else { "elif" };
        let condition = e.condition(block, &ConditionalShape::condition_socket(i));
        let body = suite(e, block, &ConditionalShape::body_socket(i));
        code.push_str(&format!("{} {}:\n{}", keyword, condition, body));
    }
    if shape.has_else {
        let else_body = e.statement_to_code(block, ELSE_SOCKET);
        if !else_body.trim().is_empty() {
            code.push_str(&format!("else:\n{}", else_body));
        }
    }
    code
}

fn led_on(_e: &mut Emitter<'_>, block: &Block) -> String {
    let color = block.field_or("COLOR", "red");
    format!("robot.led_on({})\n", quote_single(&color))
}

fn buzzer_beep(e: &mut Emitter<'_>, block: &Block) -> String {
    let frequency = e.arg(block, "FREQUENCY", order::NONE, "1000");
    let duration = e.arg(block, "DURATION", order::NONE, "1");
    format!("robot.beep({}, {})\n", frequency, duration)
}

fn speak(_e: &mut Emitter<'_>, block: &Block) -> String {
    let text = block.field_or("TEXT", "Hello");
    format!("robot.speak({})\n", quote_single(&text))
}

fn display_text(_e: &mut Emitter<'_>, block: &Block) -> String {
    let text = block.field_or("TEXT", "Hello");
    format!("robot.display_text({})\n", quote_single(&text))
}

fn send_message(_e: &mut Emitter<'_>, block: &Block) -> String {
    let message = block.field_or("MESSAGE", "Hello");
    format!("robot.send_message({})\n", quote_single(&message))
}

fn collect(e: &mut Emitter<'_>, block: &Block, color: &str) -> String {
    let count = e.arg(block, "COUNT", order::NONE, "1");
    format!("collect({}, {})\n", count, quote_single(color))
}

fn function_name(block: &Block) -> String {
    let name = block.field_or("NAME", "myFunction");
    if is_identifier(&name) {
        name
    } else {
        "myFunction".to_string()
    }
}

fn function_def(e: &mut Emitter<'_>, block: &Block) -> String {
    let name = function_name(block);
    let body = suite(e, block, "STACK");
    format!("def {}():\n{}", name, body)
}

fn function_call(_e: &mut Emitter<'_>, block: &Block) -> String {
    format!("{}()\n", function_name(block))
}

fn number(_e: &mut Emitter<'_>, block: &Block) -> (String, Order) {
    let value = block.field_or("NUM", "0");
    let order = if value.starts_with('-') {
        order::UNARY_SIGN
    } else {
        order::ATOMIC
    };
    (value, order)
}

fn boolean(_e: &mut Emitter<'_>, block: &Block) -> (String, Order) {
    let literal = if block.field_or("BOOL", "TRUE") == "TRUE" {
        LANGUAGE.true_literal
    } else {
        LANGUAGE.false_literal
    };
    (literal.to_string(), order::ATOMIC)
}

fn variable(_e: &mut Emitter<'_>, block: &Block) -> (String, Order) {
    (block.field_or("VAR", "i"), order::ATOMIC)
}

fn read_sensor(_e: &mut Emitter<'_>, block: &Block) -> (String, Order) {
    read_sensor_from(block, "motor")
}

fn read_sensor_from(block: &Block, reader: &str) -> (String, Order) {
    let sensor = block.field_or("SENSOR_TYPE", "DISTANCE");
    call(&format!("{}.read_sensor({})", reader, quote_single(&sensor)))
}

/// Operands bind tighter than the comparison itself.
fn compare_sockets(
    e: &mut Emitter<'_>,
    block: &Block,
    left: &str,
    op_field: &str,
    right: &str,
) -> (String, Order) {
    let left = e.arg(block, left, order::BITWISE_OR, "0");
    let op = comparison_operator(&block.field_or(op_field, "EQ"));
    let right = e.arg(block, right, order::BITWISE_OR, "0");
    (format!("{} {} {}", left, op, right), order::RELATIONAL)
}

fn comparison(e: &mut Emitter<'_>, block: &Block) -> (String, Order) {
    compare_sockets(e, block, "A", "OP", "B")
}

fn logic_compare(e: &mut Emitter<'_>, block: &Block) -> (String, Order) {
    compare_sockets(e, block, "LEFT", "OPERATOR", "RIGHT")
}

fn logic_operation(e: &mut Emitter<'_>, block: &Block) -> (String, Order) {
    let (op, order) = match block.field_or("OP", "AND").as_str() {
        "OR" => ("or", order::LOGICAL_OR),
        _ => ("and", order::LOGICAL_AND),
    };
    let left = e.value_or(block, "LEFT", order, LANGUAGE.false_literal);
    let right = e.value_or(block, "RIGHT", order, LANGUAGE.false_literal);
    (format!("{} {} {}", left, op, right), order)
}

fn logic_not(e: &mut Emitter<'_>, block: &Block) -> (String, Order) {
    let value = e.value_or(block, "BOOL", order::LOGICAL_NOT, LANGUAGE.false_literal);
    (format!("not {}", value), order::LOGICAL_NOT)
}

fn boolean_equals(e: &mut Emitter<'_>, block: &Block) -> (String, Order) {
    let left = e.value_or(block, "LEFT", order::BITWISE_OR, LANGUAGE.false_literal);
    let right = e.value_or(block, "RIGHT", order::BITWISE_OR, LANGUAGE.false_literal);
    (format!("{} == {}", left, right), order::RELATIONAL)
}

fn condition(e: &mut Emitter<'_>, block: &Block) -> (String, Order) {
    (e.condition(block, "CONDITION"), order::NONE)
}

fn sensor_condition(_e: &mut Emitter<'_>, block: &Block) -> (String, Order) {
    sensor_condition_from(block, "motor")
}

fn sensor_condition_from(block: &Block, reader: &str) -> (String, Order) {
    let sensor = match block.field_or("SENSOR_TYPE", "DISTANCE").as_str() {
        "LIGHT" => format!("{}.read_sensor('LIGHT')", reader),
        "TEMPERATURE" => format!("{}.read_sensor('TEMPERATURE')", reader),
        "BALE_NUMBER" => "getBaleNumber()".to_string(),
        _ => format!("{}.read_sensor('DISTANCE')", reader),
    };
    let op = comparison_operator(&block.field_or("OP", "EQ"));
    let value = block.field_or("VALUE", "0");
    (format!("{} {} {}", sensor, op, value), order::RELATIONAL)
}
